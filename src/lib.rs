//! Live guidance for stethoscope placement: body and hand landmarks from a
//! camera feed are turned into lung or cardiac auscultation sites, and hand
//! contact with each site is tracked over an exam session.

pub mod camera;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod server;
pub mod session;
pub mod tracker;

use crate::pose::PoseLandmark;

/// Body skeleton edges drawn under the targets (arms, torso, legs)
pub const POSE_CONNECTIONS: [(PoseLandmark, PoseLandmark); 12] = [
    (PoseLandmark::LeftShoulder, PoseLandmark::RightShoulder),
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftElbow),
    (PoseLandmark::LeftElbow, PoseLandmark::LeftWrist),
    (PoseLandmark::RightShoulder, PoseLandmark::RightElbow),
    (PoseLandmark::RightElbow, PoseLandmark::RightWrist),
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftHip),
    (PoseLandmark::RightShoulder, PoseLandmark::RightHip),
    (PoseLandmark::LeftHip, PoseLandmark::RightHip),
    (PoseLandmark::LeftHip, PoseLandmark::LeftKnee),
    (PoseLandmark::RightHip, PoseLandmark::RightKnee),
    (PoseLandmark::LeftKnee, PoseLandmark::LeftAnkle),
    (PoseLandmark::RightKnee, PoseLandmark::RightAnkle),
];

/// Joints drawn as dots
pub const POSE_JOINTS: [PoseLandmark; 12] = [
    PoseLandmark::LeftShoulder,
    PoseLandmark::RightShoulder,
    PoseLandmark::LeftElbow,
    PoseLandmark::RightElbow,
    PoseLandmark::LeftWrist,
    PoseLandmark::RightWrist,
    PoseLandmark::LeftHip,
    PoseLandmark::RightHip,
    PoseLandmark::LeftKnee,
    PoseLandmark::RightKnee,
    PoseLandmark::LeftAnkle,
    PoseLandmark::RightAnkle,
];

/// 21-point hand skeleton edges (wrist = 0)
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // thumb
    (0, 1), (1, 2), (2, 3), (3, 4),
    // index
    (0, 5), (5, 6), (6, 7), (7, 8),
    // middle
    (5, 9), (9, 10), (10, 11), (11, 12),
    // ring
    (9, 13), (13, 14), (14, 15), (15, 16),
    // pinky and palm edge
    (13, 17), (17, 18), (18, 19), (19, 20), (0, 17),
];

// Colors are RGB.

pub const PANEL_COLOR: u32 = 0x140F12;
pub const TEXT_COLOR: u32 = 0xFFFFFF;
pub const DIM_TEXT_COLOR: u32 = 0xA09B9B;
pub const SKELETON_COLOR: u32 = 0x414650;
pub const HAND_COLOR: u32 = 0x3C8CB4;
pub const HAND_JOINT_COLOR: u32 = 0x46BEE6;
pub const GUIDE_COLOR: u32 = 0x282832;

pub const CARDIAC_COLOR: u32 = 0xDC3C46;
pub const CARDIAC_LIGHT_COLOR: u32 = 0xFF6464;
pub const CARDIAC_TITLE_COLOR: u32 = 0xFFBE32;
pub const LUNG_COLOR: u32 = 0xDC6464;
pub const LUNG_TITLE_COLOR: u32 = 0x32C8E6;
pub const LUNG_ACCENT_COLOR: u32 = 0x78F050;

pub const ALIGNED_COLOR: u32 = 0x78E650;
pub const VISITED_COLOR: u32 = 0x50A037;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::HAND_LANDMARK_COUNT;

    #[test]
    fn test_hand_connections_in_range() {
        assert!(HAND_CONNECTIONS
            .iter()
            .all(|&(a, b)| a < HAND_LANDMARK_COUNT && b < HAND_LANDMARK_COUNT));
    }

    #[test]
    fn test_every_connection_endpoint_is_a_joint() {
        for (a, b) in POSE_CONNECTIONS {
            assert!(POSE_JOINTS.contains(&a) && POSE_JOINTS.contains(&b));
        }
    }
}

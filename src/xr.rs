//! The XR platform the session controller drives.
//!
//! These traits mirror the small part of an immersive-AR device API the core needs: a support
//! check, a session with a reference space and a hit-test source, a frame callback chain, and
//! anchors. Poses reported by the platform are in the session's [`Tracking`] frame.

use crate::coordinate_systems::Tracking;
use crate::engineering::Pose;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Features requested with a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeatures {
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl Default for SessionFeatures {
    fn default() -> Self {
        Self {
            required: vec!["hit-test".to_owned(), "local-floor".to_owned()],
            optional: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceSpaceKind {
    /// Origin on the floor where the session started.
    LocalFloor,
    /// Origin at the viewer, moving with the device.
    Viewer,
}

impl fmt::Display for ReferenceSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceSpaceKind::LocalFloor => "local-floor",
            ReferenceSpaceKind::Viewer => "viewer",
        })
    }
}

/// A platform-tracked anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub u64);

/// Identifies one requested frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// A real-world surface hit by the ray from the viewer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitResult {
    pub pose: Pose<Tracking>,
}

/// Input and lifecycle events raised by a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XrEvent {
    /// The visitor tapped the screen (the platform's primary "select" action).
    Select,
    /// The platform ended the session.
    End,
}

pub trait XrPlatform {
    fn is_supported(&self) -> bool;

    fn request_session(
        &mut self,
        features: &SessionFeatures,
    ) -> Result<Box<dyn XrSession>, SessionError>;
}

pub trait XrSession {
    fn request_reference_space(&mut self, kind: ReferenceSpaceKind) -> Result<(), SessionError>;

    /// Starts hit-testing along the forward ray of `space`.
    fn request_hit_test_source(&mut self, space: ReferenceSpaceKind) -> Result<(), SessionError>;

    /// Asks for the next frame to be delivered.
    fn request_animation_frame(&mut self) -> FrameHandle;

    fn cancel_animation_frame(&mut self, handle: FrameHandle);

    /// Drops the hit-test source and the reference spaces.
    fn release(&mut self);

    fn end(&mut self);
}

/// One delivered frame.
pub trait XrFrame {
    fn handle(&self) -> FrameHandle;

    /// The viewer's pose, if tracking is available this frame.
    fn viewer_pose(&self) -> Option<Pose<Tracking>>;

    /// Hits for this frame, nearest first.
    fn hit_test_results(&self) -> Vec<HitResult>;

    fn create_anchor(&mut self, hit: &HitResult) -> Result<AnchorId, SessionError>;

    /// The tracked pose of `anchor` this frame, if it is being tracked.
    fn anchor_pose(&self, anchor: AnchorId) -> Option<Pose<Tracking>>;
}

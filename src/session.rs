//! The immersive AR session: lifecycle, viewer pose, hit-testing, anchors, and localization.
//!
//! A session moves through `Idle -> Requesting -> Active -> Ending -> Idle`. While it is active
//! the host delivers frames to [`SessionController::on_frame`], which reads the viewer pose,
//! hit-tests, services pending anchor requests, and refreshes tracked anchors. Marker and compass
//! updates and the actual render happen afterwards, in the same frame, in the
//! [`Navigator`](crate::Navigator).
//!
//! Entering a session overrides two modes that the rest of the app owns: the camera is handed to
//! the device, and markers are unbound from the model. Both are captured on entry and restored on
//! exit, however the session ends.

use crate::camera::CameraControl;
use crate::coordinate_systems::{Scene, SiteLocal, Tracking};
use crate::coordinates::Coordinate;
use crate::engineering::Pose;
use crate::error::SessionError;
use crate::markers::MarkerBinding;
use crate::math::RigidBodyTransform;
use crate::render::RenderSurface;
use crate::room::RoomId;
use crate::vectors::Vector;
use crate::xr::{
    AnchorId, FrameHandle, HitResult, ReferenceSpaceKind, SessionFeatures, XrEvent, XrFrame,
    XrPlatform, XrSession,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Requesting,
    Active,
    Ending,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Requesting => "requesting",
            SessionPhase::Active => "active",
            SessionPhase::Ending => "ending",
        })
    }
}

/// App-wide modes a session overrides while it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeFlags {
    pub camera: CameraControl,
    pub bind_to_model: bool,
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            camera: CameraControl::default(),
            bind_to_model: true,
        }
    }
}

/// How the rooms are registered to the physical world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Localization {
    /// Calibrated to a platform anchor; the transform follows the anchor as tracking improves.
    Anchor {
        id: AnchorId,
        transform: RigidBodyTransform<Tracking, SiteLocal>,
    },
    /// Calibrated to a hit pose that could not be made into an anchor.
    StaticPose(RigidBodyTransform<Tracking, SiteLocal>),
    /// The room the viewer stood in when the session started.
    Offset {
        room_id: RoomId,
        offset: Vector<Scene>,
    },
}

impl Localization {
    pub fn binding(&self) -> MarkerBinding {
        match *self {
            Localization::Anchor { transform, .. } | Localization::StaticPose(transform) => {
                MarkerBinding::Anchor(transform)
            }
            Localization::Offset { offset, .. } => MarkerBinding::Offset(offset),
        }
    }
}

/// An anchor placed by the visitor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedAnchor {
    /// `None` if the platform could not create an anchor and the hit pose was kept instead.
    pub id: Option<AnchorId>,
    pub pose: Pose<Tracking>,
}

/// What a session should do on entry, beyond the mandatory setup.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionStart {
    /// Localize to this room (at this local position) on the first frame with a viewer pose.
    pub localize_to: Option<(RoomId, Coordinate<SiteLocal>)>,
    /// Shift the model root so that this local position is at the origin of the reference space.
    pub teleport_to: Option<Coordinate<SiteLocal>>,
}

/// What happened during one delivered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub viewer: Option<Pose<Tracking>>,
    pub hit: Option<HitResult>,
    pub localized: bool,
    pub anchor_placed: bool,
}

/// Drives one immersive session at a time.
#[derive(Default)]
pub struct SessionController {
    features: SessionFeatures,
    phase: SessionPhase,
    session: Option<Box<dyn XrSession>>,
    frame: Option<FrameHandle>,
    saved_modes: Option<ModeFlags>,
    localization: Option<Localization>,
    anchors: Vec<TrackedAnchor>,
    pending_localization: Option<(RoomId, Coordinate<SiteLocal>)>,
    place_anchor_requested: bool,
    calibrate_requested: bool,
    teleport: Option<Vector<Scene>>,
    frames: u64,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase)
            .field("frame", &self.frame)
            .field("localization", &self.localization)
            .field("anchors", &self.anchors.len())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn new(features: SessionFeatures) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn localization(&self) -> Option<&Localization> {
        self.localization.as_ref()
    }

    pub fn anchors(&self) -> &[TrackedAnchor] {
        &self.anchors
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// Offset applied to the model root for the teleport on entry, if any.
    pub fn teleport_offset(&self) -> Option<Vector<Scene>> {
        self.teleport
    }

    /// Number of frames delivered to this session.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The binding markers should use during this session, if the session decides it.
    pub fn marker_binding(&self) -> Option<MarkerBinding> {
        if !self.is_active() {
            return None;
        }
        Some(match (&self.localization, self.teleport) {
            (Some(localization), _) => localization.binding(),
            (None, Some(teleport)) => MarkerBinding::Offset(teleport),
            (None, None) => MarkerBinding::Unbound,
        })
    }

    /// Requests a session and sets it up.
    ///
    /// Fails without touching `modes` if the platform is unsupported, a session is already
    /// underway, or the platform refuses. On success `modes` is switched to device-tracked,
    /// unbound markers until [`end`](Self::end).
    pub fn start(
        &mut self,
        platform: &mut dyn XrPlatform,
        modes: &mut ModeFlags,
        start: SessionStart,
    ) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Requesting => return Err(SessionError::AlreadyRunning("being requested")),
            SessionPhase::Active => return Err(SessionError::AlreadyRunning("active")),
            SessionPhase::Ending => return Err(SessionError::AlreadyRunning("ending")),
        }
        if !platform.is_supported() {
            log::warn!("immersive AR is not supported on this device");
            return Err(SessionError::Unsupported);
        }

        self.phase = SessionPhase::Requesting;
        let mut session = match platform.request_session(&self.features) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("session request failed: {e}");
                self.phase = SessionPhase::Idle;
                return Err(e);
            }
        };
        let setup = session
            .request_reference_space(ReferenceSpaceKind::LocalFloor)
            .and_then(|()| session.request_hit_test_source(ReferenceSpaceKind::Viewer));
        if let Err(e) = setup {
            log::warn!("session setup failed: {e}");
            session.release();
            session.end();
            self.phase = SessionPhase::Idle;
            return Err(e);
        }

        self.saved_modes = Some(*modes);
        modes.camera = CameraControl::DeviceTracked;
        modes.bind_to_model = false;

        self.frame = Some(session.request_animation_frame());
        self.session = Some(session);
        self.pending_localization = start.localize_to;
        self.teleport = start
            .teleport_to
            .map(|at| -Vector::from_nalgebra_vector(at.point.coords));
        self.frames = 0;
        self.phase = SessionPhase::Active;
        log::info!(
            "AR session started (required features: {})",
            self.features.required.join(", ")
        );
        Ok(())
    }

    /// Ends the session and restores `modes` to what they were on entry.
    ///
    /// Ending a session that is not running does nothing. Returns whether a session was ended.
    pub fn end(&mut self, modes: &mut ModeFlags) -> bool {
        if !matches!(self.phase, SessionPhase::Active | SessionPhase::Requesting) {
            return false;
        }
        self.phase = SessionPhase::Ending;

        if let Some(mut session) = self.session.take() {
            if let Some(frame) = self.frame.take() {
                session.cancel_animation_frame(frame);
            }
            session.release();
            session.end();
        }
        if let Some(saved) = self.saved_modes.take() {
            *modes = saved;
        }
        self.frame = None;
        self.localization = None;
        self.anchors.clear();
        self.pending_localization = None;
        self.place_anchor_requested = false;
        self.calibrate_requested = false;
        self.teleport = None;

        self.phase = SessionPhase::Idle;
        log::info!("AR session ended after {} frames", self.frames);
        true
    }

    /// Handles an event raised by the platform.
    ///
    /// Returns whether the session ended.
    pub fn handle_event(&mut self, event: XrEvent, modes: &mut ModeFlags) -> bool {
        match event {
            XrEvent::Select => {
                if self.is_active() {
                    log::debug!("select: anchor placement requested");
                    self.place_anchor_requested = true;
                }
                false
            }
            XrEvent::End => self.end(modes),
        }
    }

    /// Calibrates on the next hit: the rooms' local origin is registered to the hit location.
    pub fn calibrate(&mut self) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        self.calibrate_requested = true;
        Ok(())
    }

    /// Localizes to the room at `local` on the next frame with a viewer pose.
    pub fn localize_to_room(
        &mut self,
        room: RoomId,
        local: Coordinate<SiteLocal>,
    ) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        self.pending_localization = Some((room, local));
        Ok(())
    }

    pub fn clear_anchors(&mut self) {
        log::debug!("dropping {} anchors", self.anchors.len());
        self.anchors.clear();
        if matches!(self.localization, Some(Localization::Anchor { .. })) {
            self.localization = None;
        }
    }

    /// Processes one delivered frame.
    ///
    /// Frames from a cancelled or superseded callback are ignored and `None` is returned.
    pub fn on_frame(
        &mut self,
        frame: &mut dyn XrFrame,
        surface: &mut dyn RenderSurface,
    ) -> Option<FrameReport> {
        if !self.is_active() || self.frame != Some(frame.handle()) {
            return None;
        }
        let session = self.session.as_mut()?;
        self.frame = Some(session.request_animation_frame());
        self.frames += 1;

        let mut report = FrameReport {
            viewer: frame.viewer_pose(),
            ..FrameReport::default()
        };
        if let Some(viewer) = report.viewer {
            surface.set_camera_pose(viewer.cast());
        }

        report.hit = frame.hit_test_results().first().copied();
        surface.set_reticle(report.hit.map(|hit| hit.pose.cast()));
        if let Some(hit) = report.hit {
            report.anchor_placed = self.service_anchor_requests(frame, &hit);
        }

        if let (Some(viewer), Some((room_id, local))) = (report.viewer, self.pending_localization) {
            self.localize(viewer, room_id, local);
            self.pending_localization = None;
            report.localized = true;
        }

        self.refresh_anchors(frame);
        Some(report)
    }

    fn service_anchor_requests(&mut self, frame: &mut dyn XrFrame, hit: &HitResult) -> bool {
        if !self.place_anchor_requested && !self.calibrate_requested {
            return false;
        }
        let calibrate = std::mem::take(&mut self.calibrate_requested);
        self.place_anchor_requested = false;

        let id = match frame.create_anchor(hit) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("anchor creation failed ({e}); keeping the hit pose instead");
                None
            }
        };
        self.anchors.push(TrackedAnchor { id, pose: hit.pose });

        if calibrate {
            // SAFETY: calibrating declares the hit location to be the rooms' local origin.
            let transform = unsafe { hit.pose.map_as_zero_in::<SiteLocal>() };
            self.localization = Some(match id {
                Some(id) => Localization::Anchor { id, transform },
                None => Localization::StaticPose(transform),
            });
            log::info!("calibrated at {}", hit.pose.position());
        }
        true
    }

    fn localize(&mut self, viewer: Pose<Tracking>, room_id: RoomId, local: Coordinate<SiteLocal>) {
        let viewer_at = viewer.position().cast::<Scene>().on_floor();
        let room_at = Coordinate::<Scene>::from_nalgebra_point(local.point).on_floor();
        let offset = viewer_at - room_at;
        log::info!("localized to room {room_id}: offset {offset}");
        self.localization = Some(Localization::Offset { room_id, offset });
    }

    fn refresh_anchors(&mut self, frame: &dyn XrFrame) {
        for anchor in &mut self.anchors {
            let Some(id) = anchor.id else { continue };
            if let Some(pose) = frame.anchor_pose(id) {
                anchor.pose = pose;
            }
        }
        if let Some(Localization::Anchor { id, transform }) = &mut self.localization {
            if let Some(pose) = frame.anchor_pose(*id) {
                // SAFETY: as in calibration; the anchor still marks the rooms' local origin.
                *transform = unsafe { pose.map_as_zero_in() };
            }
        }
    }
}

//! The navigation state machine the UI talks to.
//!
//! ```text
//! NoSelection -> PartialSelection -> PairSelected -> PreviewRendering
//!                                         |                |
//!                                         +--> SessionStarting <--+
//!                                                   |
//!                                             SessionActive -> Ended
//! ```
//!
//! A [`Navigator`] owns every collaborator through its [`NavContext`] and is the only component
//! that reports errors to the visitor. It never blocks: waiting for the renderer, the model, or
//! the room list happens through [`Retrier`]s that the host advances with [`Navigator::tick`], and
//! the immersive session advances through [`Navigator::on_xr_frame`].
//!
//! Everything the UI should show is queued as [`NavEvent`]s and handed out by
//! [`Navigator::drain_events`].

use crate::aligner::ModelAligner;
use crate::camera::{self, CameraControl, FreeRoamCamera, MoveInput};
use crate::compass::CompassReading;
use crate::config::WayfinderConfig;
use crate::coordinate_systems::{ModelLocal, Scene};
use crate::engineering::Pose;
use crate::error::{DirectoryError, Error, SelectionError, SessionError, UserError};
use crate::markers::{MarkerBinding, MarkerManager, MarkerRole, Placement};
use crate::math::Similarity;
use crate::model::{self, AssetLoader, LoadedModel};
use crate::render::RenderSurface;
use crate::retry::{Retrier, RetryPoll};
use crate::room::{NavigationPair, Room, RoomCache, RoomDirectory, RoomId};
use crate::session::{FrameReport, ModeFlags, SessionController, SessionStart};
use crate::transform::to_scene_position;
use crate::xr::{XrEvent, XrFrame, XrPlatform};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationState {
    #[default]
    NoSelection,
    PartialSelection,
    PairSelected,
    PreviewRendering,
    SessionStarting,
    SessionActive,
    Ended,
}

impl NavigationState {
    /// Whether the rooms are locked because a session is starting or running.
    pub fn in_session(self) -> bool {
        matches!(
            self,
            NavigationState::SessionStarting | NavigationState::SessionActive
        )
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happens when an AR session starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Register the current room to where the visitor stands on the first tracked frame.
    #[serde(default = "default_localize_on_start")]
    pub localize_on_start: bool,
    /// Shift the model so that the current room is at the origin of the session's floor space.
    #[serde(default)]
    pub teleport_on_start: bool,
}

fn default_localize_on_start() -> bool {
    true
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            localize_on_start: default_localize_on_start(),
            teleport_on_start: false,
        }
    }
}

/// Something the UI should show.
#[derive(Clone, Debug, PartialEq)]
pub enum NavEvent {
    Status(String),
    Error(UserError),
    /// The visitor reached the destination. Emitted once per navigation.
    Arrived,
}

/// Every collaborator and component the navigator drives.
///
/// The context is built once at startup and then only mutated through the [`Navigator`] that
/// owns it, so at any time exactly one component writes the scene, the model root, or the
/// session.
pub struct NavContext<S, X, L, D> {
    pub surface: S,
    pub platform: X,
    pub loader: L,
    pub directory: D,
    pub rooms: RoomCache,
    pub aligner: ModelAligner,
    pub model: Option<LoadedModel>,
    pub markers: MarkerManager,
    pub session: SessionController,
    pub modes: ModeFlags,
    pub free_roam: FreeRoamCamera,
}

impl<S, X, L, D> NavContext<S, X, L, D> {
    pub fn new(config: &WayfinderConfig, surface: S, platform: X, loader: L, directory: D) -> Self {
        Self {
            surface,
            platform,
            loader,
            directory,
            rooms: RoomCache::default(),
            aligner: ModelAligner::new(config.aligner.clone()),
            model: None,
            markers: MarkerManager::new(config.markers.clone(), config.transform),
            session: SessionController::new(config.session.clone()),
            modes: ModeFlags {
                camera: CameraControl::Orbit,
                bind_to_model: config.markers.bind_to_model,
            },
            free_roam: FreeRoamCamera::new(config.free_roam),
        }
    }
}

impl<S, X, L, D> fmt::Debug for NavContext<S, X, L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavContext")
            .field("rooms", &self.rooms.rooms().len())
            .field("model", &self.model)
            .field("markers", &self.markers)
            .field("session", &self.session)
            .field("modes", &self.modes)
            .finish_non_exhaustive()
    }
}

struct PendingStart {
    retrier: Retrier,
    resume: NavigationState,
}

struct PendingPreselect {
    number: String,
    retrier: Retrier,
}

/// The navigation state machine.
pub struct Navigator<S, X, L, D> {
    config: WayfinderConfig,
    context: NavContext<S, X, L, D>,
    state: NavigationState,
    current: Option<RoomId>,
    destination: Option<RoomId>,
    pair: Option<NavigationPair>,
    starting: Option<PendingStart>,
    preselect: Option<PendingPreselect>,
    events: VecDeque<NavEvent>,
    frame: u64,
}

impl<S, X, L, D> fmt::Debug for Navigator<S, X, L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("destination", &self.destination)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<S, X, L, D> Navigator<S, X, L, D>
where
    S: RenderSurface,
    X: XrPlatform,
    L: AssetLoader,
    D: RoomDirectory,
{
    pub fn new(config: WayfinderConfig, surface: S, platform: X, loader: L, directory: D) -> Self {
        let context = NavContext::new(&config, surface, platform, loader, directory);
        Self {
            config,
            context,
            state: NavigationState::NoSelection,
            current: None,
            destination: None,
            pair: None,
            starting: None,
            preselect: None,
            events: VecDeque::new(),
            frame: 0,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn config(&self) -> &WayfinderConfig {
        &self.config
    }

    pub fn context(&self) -> &NavContext<S, X, L, D> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut NavContext<S, X, L, D> {
        &mut self.context
    }

    pub fn pair(&self) -> Option<&NavigationPair> {
        self.pair.as_ref()
    }

    pub fn selection(&self) -> (Option<RoomId>, Option<RoomId>) {
        (self.current, self.destination)
    }

    /// Hands out everything queued for the UI since the last call.
    pub fn drain_events(&mut self) -> Vec<NavEvent> {
        self.events.drain(..).collect()
    }

    fn status(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("status: {message}");
        self.events.push_back(NavEvent::Status(message));
    }

    fn fail(&mut self, error: impl Into<UserError>) -> UserError {
        let error = error.into();
        log::warn!("{error}");
        self.events.push_back(NavEvent::Error(error.clone()));
        error
    }

    /// Replaces the room cache with a fresh snapshot of the directory.
    pub fn refresh_rooms(&mut self) -> Result<usize, DirectoryError> {
        let context = &mut self.context;
        match context.rooms.refresh(&mut context.directory) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.fail(UserError::Other(format!("Could not load rooms: {e}")));
                Err(e)
            }
        }
    }

    /// The binding markers are placed with right now.
    ///
    /// A running session decides on its own; otherwise markers follow the model root when bound
    /// to it and are placed as-is when not.
    pub fn binding(&self) -> MarkerBinding {
        let context = &self.context;
        if let Some(binding) = context.session.marker_binding() {
            return binding;
        }
        if context.modes.bind_to_model {
            MarkerBinding::Model(context.aligner.transform().to_similarity())
        } else {
            MarkerBinding::Unbound
        }
    }

    /// Where `room` is in the scene under the current binding.
    pub fn room_scene_position(&self, room: &Room) -> crate::Coordinate<Scene> {
        self.context.markers.scene_position(room, &self.binding())
    }

    pub fn on_select_current(&mut self, room: RoomId, now: Instant) -> Result<(), UserError> {
        self.select(MarkerRole::Current, room, now)
    }

    pub fn on_select_destination(&mut self, room: RoomId, now: Instant) -> Result<(), UserError> {
        self.select(MarkerRole::Destination, room, now)
    }

    fn select(&mut self, role: MarkerRole, room: RoomId, now: Instant) -> Result<(), UserError> {
        if self.state.in_session() {
            return Err(self.fail(SelectionError::SessionActive));
        }
        if self.context.rooms.get(room).is_none() {
            return Err(self.fail(SelectionError::UnknownRoom(room)));
        }
        let other = match role {
            MarkerRole::Current => self.destination,
            MarkerRole::Destination => self.current,
        };
        if other == Some(room) {
            return Err(self.fail(SelectionError::SameRoom));
        }

        match role {
            MarkerRole::Current => self.current = Some(room),
            MarkerRole::Destination => self.destination = Some(room),
        }
        log::debug!("selected room {room} as {role}");

        let (Some(current), Some(destination)) = (self.current, self.destination) else {
            self.state = NavigationState::PartialSelection;
            return Ok(());
        };
        let rooms = &self.context.rooms;
        let (Some(current), Some(destination)) = (rooms.get(current), rooms.get(destination))
        else {
            return Err(self.fail(SelectionError::Incomplete));
        };
        let pair = NavigationPair::new(current.clone(), destination.clone())
            .map_err(|e| self.fail(e))?;
        self.pair = Some(pair);
        self.state = NavigationState::PairSelected;
        self.preview(now);
        Ok(())
    }

    /// Shows both rooms of the selected pair in the non-immersive view.
    fn preview(&mut self, now: Instant) {
        if self.context.surface.is_ready() {
            if let Err(e) = self.ensure_model() {
                log::warn!("previewing without the model: {e}");
            }
        }
        let Some(pair) = self.pair.clone() else {
            return;
        };
        let binding = self.binding();
        let context = &mut self.context;
        match context
            .markers
            .set_navigation_pair(&pair, &binding, &mut context.surface, now)
        {
            Placement::Placed => self.previewed(),
            Placement::Deferred => self.status("Waiting for the 3D view..."),
            Placement::Abandoned { .. } => self.status("The 3D view is not available"),
        }
    }

    fn previewed(&mut self) {
        if self.state != NavigationState::PairSelected {
            return;
        }
        self.state = NavigationState::PreviewRendering;
        if let Some(current) = self.context.markers.marker(MarkerRole::Current) {
            if self.context.modes.camera == CameraControl::Orbit {
                camera::move_camera_to_room(&mut self.context.surface, current.position);
            }
        }
        if let Some(pair) = &self.pair {
            let message = format!(
                "Route: {} to {}",
                pair.current().marker_label(),
                pair.destination().marker_label()
            );
            self.status(message);
        }
    }

    /// Loads, places, and aligns the model if that has not happened yet.
    pub fn ensure_model(&mut self) -> Result<(), Error> {
        if self.context.model.is_some() {
            return Ok(());
        }
        let mut model = model::load_model(&mut self.context.loader, &self.config.model)?;
        model.fit_to_rooms(
            self.context.rooms.rooms(),
            self.config.aligner.auto_scale,
            self.config.aligner.world_scale,
        );
        self.context.model = Some(model);
        self.align_model();
        Ok(())
    }

    /// Fits the loaded model onto the rooms and hands the result to the surface.
    ///
    /// If the fit fails the previous model root is kept.
    pub fn align_model(&mut self) {
        let context = &mut self.context;
        let Some(model) = &context.model else {
            return;
        };
        if let Err(e) = context.aligner.align(
            &model.vertices(),
            context.rooms.rooms(),
            &self.config.transform,
        ) {
            log::warn!("keeping the previous model placement: {e}");
        }
        self.apply_model_root();
    }

    /// Re-centers the model on its root and aligns it again.
    pub fn recenter_model(&mut self) {
        let Some(model) = &mut self.context.model else {
            return;
        };
        model.recenter(
            self.config.aligner.auto_scale,
            self.config.aligner.world_scale,
        );
        self.align_model();
    }

    /// Sets the user multiplier on the model scale. Non-positive multipliers are ignored.
    pub fn set_model_scale(&mut self, multiplier: f64) -> bool {
        if !self.context.aligner.set_model_scale(multiplier) {
            return false;
        }
        self.apply_model_root();
        true
    }

    fn model_root(&self) -> Similarity<Scene, ModelLocal> {
        let root = self.context.aligner.transform().to_similarity();
        match self.context.session.teleport_offset() {
            // SAFETY: the teleport only moves the model root within the scene.
            Some(offset) => unsafe {
                Similarity::new(root.translation() + offset, root.rotation(), root.scale())
            },
            None => root,
        }
    }

    fn apply_model_root(&mut self) {
        let root = self.model_root();
        self.context.surface.set_model_transform(root);
        let binding = self.binding();
        let context = &mut self.context;
        context.markers.update_marker_positions(
            context.rooms.rooms(),
            &binding,
            &mut context.surface,
        );
    }

    /// Starts AR navigation for the selected pair.
    ///
    /// The session is requested once the surface and the model are ready. If they are not ready
    /// now, [`tick`](Self::tick) keeps checking under the configured start policy.
    pub fn start(&mut self, now: Instant) -> Result<(), UserError> {
        match self.state {
            NavigationState::PairSelected | NavigationState::PreviewRendering => {}
            NavigationState::SessionStarting => {
                return Err(self.fail(SessionError::AlreadyRunning("starting")))
            }
            NavigationState::SessionActive => {
                return Err(self.fail(SessionError::AlreadyRunning("active")))
            }
            _ => return Err(self.fail(SelectionError::Incomplete)),
        }
        self.starting = Some(PendingStart {
            retrier: self.config.retry.start.start(),
            resume: self.state,
        });
        self.state = NavigationState::SessionStarting;
        self.status("Starting AR...");
        self.poll_start(now).unwrap_or(Ok(()))
    }

    fn poll_start(&mut self, now: Instant) -> Option<Result<(), UserError>> {
        let mut pending = self.starting.take()?;
        let surface_ready = self.context.surface.is_ready();
        let poll = pending.retrier.poll(now, || {
            if !surface_ready {
                return None;
            }
            match self.ensure_model() {
                Ok(()) => Some(()),
                Err(e) => {
                    log::warn!("model not ready: {e}");
                    None
                }
            }
        });
        match poll {
            RetryPoll::Ready(()) => Some(self.begin_session(pending.resume)),
            RetryPoll::Pending => {
                self.starting = Some(pending);
                None
            }
            RetryPoll::Exhausted { attempts } => {
                log::warn!("AR not ready after {attempts} attempts");
                self.state = NavigationState::PairSelected;
                Some(Err(self.fail(UserError::NotReady)))
            }
        }
    }

    fn begin_session(&mut self, resume: NavigationState) -> Result<(), UserError> {
        let Some(pair) = self.pair.clone() else {
            self.state = NavigationState::NoSelection;
            return Err(self.fail(SelectionError::Incomplete));
        };
        let current = to_scene_position(pair.current(), self.context.markers.transform_config());
        let start = SessionStart {
            localize_to: self
                .config
                .navigation
                .localize_on_start
                .then_some((pair.current().id, current)),
            teleport_to: self.config.navigation.teleport_on_start.then_some(current),
        };

        let context = &mut self.context;
        if let Err(e) = context
            .session
            .start(&mut context.platform, &mut context.modes, start)
        {
            self.state = resume;
            return Err(self.fail(e));
        }

        self.state = NavigationState::SessionActive;
        self.apply_model_root();
        if let Some(target) = self
            .context
            .markers
            .marker(MarkerRole::Destination)
            .map(|m| m.position)
        {
            self.context.markers.compass_mut().set_target(target);
        }
        self.status(format!(
            "Navigating to {}",
            pair.destination().marker_label()
        ));
        Ok(())
    }

    /// Advances everything that waits on time: a pending start, a pending destination
    /// preselection, and deferred marker placement.
    pub fn tick(&mut self, now: Instant) {
        if let Some(Err(e)) = self.poll_start(now) {
            log::debug!("start failed: {e}");
        }
        self.poll_preselect(now);

        let binding = self.binding();
        let context = &mut self.context;
        match context
            .markers
            .poll(&binding, &mut context.surface, now)
        {
            Some(Placement::Placed) => {
                if let Err(e) = self.ensure_model() {
                    log::warn!("previewing without the model: {e}");
                }
                self.previewed();
            }
            Some(Placement::Abandoned { .. }) => self.status("The 3D view is not available"),
            Some(Placement::Deferred) | None => {}
        }
    }

    /// Processes one immersive frame: pose first, then markers, then the compass, then the
    /// render.
    pub fn on_xr_frame(&mut self, frame: &mut dyn XrFrame) -> Option<FrameReport> {
        if self.state != NavigationState::SessionActive {
            return None;
        }
        let report = self
            .context
            .session
            .on_frame(frame, &mut self.context.surface)?;
        if report.localized {
            if let Some(pair) = &self.pair {
                let message = format!("Localized to {}", pair.current().marker_label());
                self.status(message);
            }
        }
        self.update_overlay();
        Some(report)
    }

    /// Processes one non-immersive frame: markers, compass, and render.
    pub fn on_animation_frame(&mut self) -> Option<CompassReading> {
        if self.state == NavigationState::SessionActive {
            return None;
        }
        self.update_overlay()
    }

    fn update_overlay(&mut self) -> Option<CompassReading> {
        self.frame += 1;
        let binding = self.binding();
        let context = &mut self.context;
        context.markers.update_marker_positions(
            context.rooms.rooms(),
            &binding,
            &mut context.surface,
        );
        let reading = context.markers.update_compass(self.frame, &mut context.surface);
        // walking up to the room only counts on foot; a preview camera may fly past it
        let immersive = self.state == NavigationState::SessionActive;
        if immersive && context.markers.compass_mut().take_arrival() {
            self.events.push_back(NavEvent::Arrived);
            if let Some(pair) = &self.pair {
                let message = format!("Arrived at {}", pair.destination().name);
                self.status(message);
            }
        }
        self.context.surface.render();
        reading
    }

    /// Handles an event raised by the XR platform.
    pub fn on_xr_event(&mut self, event: XrEvent) {
        let context = &mut self.context;
        if context.session.handle_event(event, &mut context.modes) {
            self.session_ended();
        }
    }

    /// Ends AR navigation, removing the markers and forgetting the pair. Stopping when nothing is
    /// running does nothing.
    pub fn stop(&mut self) {
        if self.starting.take().is_some() {
            self.state = NavigationState::PairSelected;
            self.status("AR start cancelled");
            return;
        }
        let context = &mut self.context;
        if context.session.end(&mut context.modes) {
            self.session_ended();
        }
    }

    fn session_ended(&mut self) {
        self.state = NavigationState::Ended;
        self.apply_model_root();
        let context = &mut self.context;
        context.markers.clear(&mut context.surface);
        context.surface.set_reticle(None);
        self.current = None;
        self.destination = None;
        self.pair = None;
        self.status("AR session ended");
    }

    /// Calibrates on the next hit: the rooms' local origin is registered to the hit location.
    pub fn calibrate(&mut self) -> Result<(), UserError> {
        match self.context.session.calibrate() {
            Ok(()) => {
                self.status("Point at the floor to calibrate");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Closes navigation from any state: ends the session, removes the markers, and forgets the
    /// selection.
    pub fn close(&mut self) {
        let context = &mut self.context;
        if context.session.end(&mut context.modes) {
            log::debug!("session ended on close");
            self.apply_model_root();
        }
        let context = &mut self.context;
        context.markers.clear(&mut context.surface);
        context.surface.set_reticle(None);
        self.current = None;
        self.destination = None;
        self.pair = None;
        self.starting = None;
        self.preselect = None;
        self.state = NavigationState::NoSelection;
    }

    /// Selects the destination by room number once the room list has it.
    ///
    /// Used when navigation is opened for a specific room; the room list may still be loading.
    pub fn preselect_destination(&mut self, number: &str, now: Instant) {
        self.preselect = Some(PendingPreselect {
            number: number.trim().to_owned(),
            retrier: self.config.retry.preselect.start(),
        });
        self.poll_preselect(now);
    }

    fn poll_preselect(&mut self, now: Instant) {
        let Some(mut pending) = self.preselect.take() else {
            return;
        };
        let poll = pending.retrier.poll(now, || {
            if self.context.rooms.is_empty() {
                // an unavailable directory is retried like an empty one
                let _ = self.context.rooms.refresh(&mut self.context.directory);
            }
            self.context
                .rooms
                .find_by_number(&pending.number)
                .map(|room| room.id)
        });
        match poll {
            RetryPoll::Ready(room) => {
                log::info!("preselected room {} as destination", pending.number);
                // a rejection is already reported to the UI
                let _ = self.on_select_destination(room, now);
            }
            RetryPoll::Pending => self.preselect = Some(pending),
            RetryPoll::Exhausted { .. } => {
                self.fail(UserError::Other(format!("Room {} not found", pending.number)));
            }
        }
    }

    /// Switches between the orbit controls and the free-roam camera.
    ///
    /// Has no effect while the device drives the camera.
    pub fn toggle_free_roam(&mut self) -> CameraControl {
        let context = &mut self.context;
        context.modes.camera = match context.modes.camera {
            CameraControl::Orbit => {
                context.free_roam.take_over(&context.surface.camera_pose());
                CameraControl::FreeRoam
            }
            CameraControl::FreeRoam => CameraControl::Orbit,
            CameraControl::DeviceTracked => CameraControl::DeviceTracked,
        };
        log::debug!("camera control: {:?}", context.modes.camera);
        context.modes.camera
    }

    /// Moves the free-roam camera. Returns `None` unless free roam is active.
    pub fn update_free_roam(
        &mut self,
        input: MoveInput,
        look: (f64, f64),
        elapsed: Duration,
    ) -> Option<Pose<Scene>> {
        let context = &mut self.context;
        if context.modes.camera != CameraControl::FreeRoam {
            return None;
        }
        context.free_roam.look(look.0, look.1);
        let pose = context.free_roam.update(input, elapsed);
        context.surface.set_camera_pose(pose);
        Some(pose)
    }

    /// Points the camera so that the whole model is in view.
    pub fn frame_model(&mut self) -> bool {
        let root = self.model_root();
        let context = &mut self.context;
        let Some(bounds) = context
            .model
            .as_ref()
            .and_then(|model| model::scene_bounds(model, root))
        else {
            return false;
        };
        let pose = model::frame_bounds(
            &bounds,
            &context.surface.camera_pose(),
            context.surface.field_of_view(),
        );
        context.surface.set_camera_pose(pose);
        if context.modes.camera == CameraControl::FreeRoam {
            context.free_roam.take_over(&pose);
        }
        true
    }

    /// Points the camera at `room` from above and behind.
    pub fn move_camera_to_room(&mut self, room: RoomId) -> Result<(), UserError> {
        let Some(room) = self.context.rooms.get(room).cloned() else {
            return Err(self.fail(SelectionError::UnknownRoom(room)));
        };
        let at = self.room_scene_position(&room);
        camera::move_camera_to_room(&mut self.context.surface, at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_systems::Tracking;
    use crate::coordinates::Coordinate;
    use crate::engineering::Orientation;
    use crate::testing::{FakeDirectory, FakeFrame, FakeLoader, FakeModel, FakeSurface, FakeXr};
    use crate::transform::TransformConfig;
    use crate::vectors::Vector;
    use crate::xr::FrameHandle;
    use uom::si::f64::Length;
    use uom::si::length::meter;

    const MS: Duration = Duration::from_millis(1);

    type TestNavigator = Navigator<FakeSurface, FakeXr, FakeLoader, FakeDirectory>;

    const ROOMS: &str = r#"{"rooms": [
        {"id": 1, "number": "101", "name": "Lab", "coordinates": {"x": 0, "y": 0, "z": 0}},
        {"id": 2, "number": "102", "name": "Office", "coordinates": "10,0,0"},
        {"id": 3, "number": "103", "name": "Library", "coordinates": {"x": 0, "y": 10, "z": 0}}
    ]}"#;

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn config() -> WayfinderConfig {
        WayfinderConfig {
            transform: TransformConfig {
                scale: 1.,
                ..TransformConfig::default()
            },
            ..WayfinderConfig::default()
        }
    }

    fn model() -> FakeModel {
        FakeModel::new(vec![
            [0., 0., 0.],
            [10., 0., 0.],
            [0., 0., -10.],
            [5., 3., -5.],
        ])
    }

    fn navigator_with(surface: FakeSurface, xr: FakeXr) -> TestNavigator {
        let mut nav = Navigator::new(
            config(),
            surface,
            xr,
            FakeLoader::new(model()),
            FakeDirectory::new(ROOMS),
        );
        nav.refresh_rooms().expect("rooms load");
        nav
    }

    fn navigator() -> TestNavigator {
        navigator_with(FakeSurface::ready(), FakeXr::supported())
    }

    fn errors(nav: &mut TestNavigator) -> Vec<UserError> {
        nav.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NavEvent::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn viewer(x: f64, z: f64) -> Pose<Tracking> {
        Pose::new(
            Coordinate::from_cartesian(m(x), m(1.6), m(z)),
            Orientation::default(),
        )
    }

    fn selected(nav: &mut TestNavigator, now: Instant) {
        nav.on_select_current(RoomId(1), now).expect("known room");
        nav.on_select_destination(RoomId(2), now).expect("distinct room");
    }

    #[test]
    fn selecting_a_pair_previews_it() {
        let mut nav = navigator();
        let now = Instant::now();

        nav.on_select_current(RoomId(1), now).expect("known room");
        assert_eq!(nav.state(), NavigationState::PartialSelection);
        assert!(nav.context().markers.markers().is_empty());

        nav.on_select_destination(RoomId(2), now).expect("distinct room");
        assert_eq!(nav.state(), NavigationState::PreviewRendering);
        assert_eq!(nav.context().markers.markers().len(), 2);
        assert_eq!(nav.context().surface.nodes.len(), 2);
        // the model was loaded and aligned for the preview
        assert!(nav.context().model.is_some());
        assert!(nav.context().surface.model_root.is_some());

        // picking another destination replaces the markers
        nav.on_select_destination(RoomId(3), now).expect("distinct room");
        assert_eq!(nav.context().surface.nodes.len(), 2);
        assert_eq!(nav.pair().map(|p| p.destination().id), Some(RoomId(3)));
    }

    #[test]
    fn same_room_is_rejected_without_a_state_change() {
        let mut nav = navigator();
        let now = Instant::now();
        nav.on_select_current(RoomId(1), now).expect("known room");
        assert_eq!(
            nav.on_select_destination(RoomId(1), now),
            Err(SelectionError::SameRoom.into())
        );
        assert_eq!(nav.state(), NavigationState::PartialSelection);
        assert_eq!(nav.selection(), (Some(RoomId(1)), None));
        insta::assert_snapshot!(errors(&mut nav)[0].to_string(), @"Please select different rooms");
    }

    #[test]
    fn unknown_rooms_are_rejected() {
        let mut nav = navigator();
        assert_eq!(
            nav.on_select_current(RoomId(42), Instant::now()),
            Err(SelectionError::UnknownRoom(RoomId(42)).into())
        );
        assert_eq!(nav.state(), NavigationState::NoSelection);
    }

    #[test]
    fn start_needs_a_pair() {
        let mut nav = navigator();
        assert_eq!(
            nav.start(Instant::now()),
            Err(SelectionError::Incomplete.into())
        );
        insta::assert_snapshot!(
            errors(&mut nav)[0].to_string(),
            @"Please select both current location and destination"
        );
    }

    #[test]
    fn unsupported_platform_stays_in_preview() {
        let mut nav = navigator_with(FakeSurface::ready(), FakeXr::unsupported());
        let now = Instant::now();
        selected(&mut nav, now);
        let modes = nav.context().modes;

        assert_eq!(
            nav.start(now),
            Err(SessionError::Unsupported.into())
        );
        assert_eq!(nav.state(), NavigationState::PreviewRendering);
        assert_eq!(nav.context().modes, modes);
        assert!(errors(&mut nav).contains(&SessionError::Unsupported.into()));
    }

    #[test]
    fn start_gives_up_when_the_surface_never_appears() {
        let mut nav = navigator_with(FakeSurface::not_ready(), FakeXr::supported());
        let start = Instant::now();
        selected(&mut nav, start);
        assert_eq!(nav.state(), NavigationState::PairSelected);

        nav.start(start).expect("waits for the surface");
        assert_eq!(nav.state(), NavigationState::SessionStarting);
        for attempt in 1..15 {
            nav.tick(start + attempt * 300 * MS);
        }
        assert_eq!(nav.state(), NavigationState::PairSelected);
        assert!(errors(&mut nav).contains(&UserError::NotReady));
        assert!(nav.context().platform.requests.is_empty());
    }

    #[test]
    fn start_waits_for_the_surface() {
        let mut nav = navigator_with(FakeSurface::not_ready(), FakeXr::supported());
        let start = Instant::now();
        selected(&mut nav, start);
        nav.start(start).expect("waits for the surface");

        nav.context_mut().surface.ready = true;
        nav.tick(start + 300 * MS);
        assert_eq!(nav.state(), NavigationState::SessionActive);
        assert_eq!(nav.context().platform.requests.len(), 1);
    }

    #[test]
    fn active_sessions_lock_the_selection() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.start(now).expect("ready and supported");
        assert_eq!(nav.state(), NavigationState::SessionActive);

        assert_eq!(
            nav.on_select_destination(RoomId(3), now),
            Err(SelectionError::SessionActive.into())
        );
        assert_eq!(
            nav.start(now),
            Err(SessionError::AlreadyRunning("active").into())
        );
        assert_eq!(nav.context().platform.requests.len(), 1);
        assert_eq!(nav.pair().map(|p| p.destination().id), Some(RoomId(2)));
    }

    #[test]
    fn stopping_restores_the_camera_mode() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        assert_eq!(nav.toggle_free_roam(), CameraControl::FreeRoam);

        nav.start(now).expect("ready and supported");
        assert_eq!(nav.context().modes.camera, CameraControl::DeviceTracked);
        assert!(!nav.context().modes.bind_to_model);
        // the device owns the camera now
        assert_eq!(nav.toggle_free_roam(), CameraControl::DeviceTracked);

        nav.stop();
        assert_eq!(nav.state(), NavigationState::Ended);
        assert_eq!(nav.context().modes.camera, CameraControl::FreeRoam);
        assert!(nav.context().modes.bind_to_model);

        // stopping twice is harmless
        nav.stop();
        assert_eq!(nav.state(), NavigationState::Ended);
    }

    #[test]
    fn stopping_clears_the_route() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.start(now).expect("ready and supported");
        nav.on_xr_frame(&mut FakeFrame::new(FrameHandle(1)).viewer(viewer(0., 0.)));

        nav.stop();
        assert_eq!(nav.state(), NavigationState::Ended);
        assert!(nav.context().markers.markers().is_empty());
        assert!(nav.context().surface.nodes.is_empty());
        assert!(nav.context().markers.compass().target().is_none());
        assert!(nav.context().surface.compass.is_none());
        assert!(nav.context().surface.reticle.is_none());
        assert!(nav.pair().is_none());
        nav.drain_events();

        // a new route is picked from scratch
        assert_eq!(
            nav.start(now),
            Err(UserError::Selection(SelectionError::Incomplete))
        );
        selected(&mut nav, now);
        assert_eq!(nav.state(), NavigationState::PreviewRendering);
        assert_eq!(nav.context().surface.nodes.len(), 2);
    }

    #[test]
    fn preview_camera_passing_the_destination_does_not_arrive() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.on_animation_frame();
        nav.drain_events();

        let destination = nav
            .context()
            .markers
            .marker(MarkerRole::Destination)
            .expect("placed")
            .position;
        let beside = destination + Vector::<Scene>::from_cartesian(m(0.5), m(1.6), m(0.));
        nav.context_mut().surface.camera = Pose::new(beside, Orientation::default());

        let reading = nav.on_animation_frame().expect("camera and target");
        assert!(reading.has_arrived());
        assert!(!nav.drain_events().contains(&NavEvent::Arrived));
    }

    #[test]
    fn platform_end_ends_navigation() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.start(now).expect("ready and supported");
        nav.on_xr_event(XrEvent::End);
        assert_eq!(nav.state(), NavigationState::Ended);
        assert!(nav.pair().is_none());
        assert!(nav.context().surface.nodes.is_empty());
        assert!(nav
            .on_xr_frame(&mut FakeFrame::new(FrameHandle(1)).viewer(viewer(0., 0.)))
            .is_none());
    }

    #[test]
    fn walking_to_the_destination() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.start(now).expect("ready and supported");
        nav.drain_events();

        // first tracked frame: the current room is registered under the viewer
        let mut frame = FakeFrame::new(FrameHandle(1)).viewer(viewer(0., 0.));
        let report = nav.on_xr_frame(&mut frame).expect("active session");
        assert!(report.localized);
        let destination = nav
            .context()
            .markers
            .marker(MarkerRole::Destination)
            .expect("placed");
        assert_eq!(
            destination.position,
            Coordinate::from_cartesian(m(10.), m(0.), m(0.))
        );
        let label = nav.context().surface.compass.as_ref().expect("drawn").label.clone();
        insta::assert_snapshot!(label, @"10.1m");
        assert_eq!(nav.context().surface.renders, 1);

        nav.on_xr_frame(&mut FakeFrame::new(FrameHandle(2)).viewer(viewer(9.5, 0.)));
        nav.on_xr_frame(&mut FakeFrame::new(FrameHandle(3)).viewer(viewer(9.6, 0.)));
        let events = nav.drain_events();
        assert_eq!(
            events.iter().filter(|e| **e == NavEvent::Arrived).count(),
            1
        );
        assert!(events.contains(&NavEvent::Status("Arrived at Office".to_owned())));
    }

    #[test]
    fn calibration_needs_a_session() {
        let mut nav = navigator();
        assert_eq!(nav.calibrate(), Err(SessionError::NotActive.into()));
    }

    #[test]
    fn closing_clears_everything() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        nav.start(now).expect("ready and supported");

        nav.close();
        assert_eq!(nav.state(), NavigationState::NoSelection);
        assert_eq!(nav.selection(), (None, None));
        assert!(nav.pair().is_none());
        assert!(nav.context().surface.nodes.is_empty());
        assert!(nav.context().surface.compass.is_none());
        assert_eq!(nav.context().modes.camera, CameraControl::Orbit);
        assert!(nav.context().platform.log.borrow().contains(&"end".to_owned()));
    }

    #[test]
    fn deferred_preview() {
        let mut nav = navigator_with(FakeSurface::not_ready(), FakeXr::supported());
        let start = Instant::now();
        selected(&mut nav, start);
        assert_eq!(nav.state(), NavigationState::PairSelected);
        assert!(nav.context().markers.is_pending());

        nav.context_mut().surface.ready = true;
        nav.tick(start + 200 * MS);
        assert_eq!(nav.state(), NavigationState::PreviewRendering);
        assert_eq!(nav.context().surface.nodes.len(), 2);
    }

    #[test]
    fn preselection_waits_for_the_room_list() {
        let mut nav = Navigator::new(
            config(),
            FakeSurface::ready(),
            FakeXr::supported(),
            FakeLoader::new(model()),
            FakeDirectory {
                payload: None,
                fetches: 0,
            },
        );
        let start = Instant::now();
        nav.preselect_destination(" 103 ", start);
        assert_eq!(nav.selection(), (None, None));

        nav.context_mut().directory.payload = Some(ROOMS.to_owned());
        nav.tick(start + 100 * MS);
        assert_eq!(nav.selection(), (None, Some(RoomId(3))));
        assert_eq!(nav.context().directory.fetches, 2);
    }

    #[test]
    fn preselection_gives_up() {
        let mut nav = navigator();
        let start = Instant::now();
        nav.preselect_destination("999", start);
        for attempt in 1..20 {
            nav.tick(start + attempt * 100 * MS);
        }
        insta::assert_snapshot!(errors(&mut nav)[0].to_string(), @"Room 999 not found");
    }

    #[test]
    fn free_roam_moves_the_camera() {
        let mut nav = navigator();
        assert!(nav
            .update_free_roam(MoveInput::default(), (0., 0.), 16 * MS)
            .is_none());

        nav.toggle_free_roam();
        let forward = MoveInput {
            forward: 1.,
            ..MoveInput::default()
        };
        let pose = nav
            .update_free_roam(forward, (0., 0.), 100 * MS)
            .expect("free roam is on");
        assert_eq!(nav.context().surface.camera, pose);
        assert_eq!(nav.toggle_free_roam(), CameraControl::Orbit);
    }

    #[test]
    fn framing_needs_a_model() {
        let mut nav = navigator();
        assert!(!nav.frame_model());
        nav.ensure_model().expect("loads");
        assert!(nav.frame_model());
    }

    #[test]
    fn scaling_the_model_moves_bound_markers() {
        let mut nav = navigator();
        let now = Instant::now();
        selected(&mut nav, now);
        let before = nav
            .context()
            .markers
            .marker(MarkerRole::Destination)
            .expect("placed")
            .position;
        assert!(nav.set_model_scale(2.));
        assert!(!nav.set_model_scale(-1.));
        let after = nav
            .context()
            .markers
            .marker(MarkerRole::Destination)
            .expect("placed")
            .position;
        assert_ne!(before, after);
    }
}

//! In-memory collaborators for tests.

use crate::compass::CompassDial;
use crate::coordinate_systems::{AssetLocal, ModelLocal, Scene, Tracking};
use crate::coordinates::Coordinate;
use crate::engineering::Pose;
use crate::error::{AssetError, DirectoryError, SessionError};
use crate::math::Similarity;
use crate::model::{AssetLoader, ModelHandle};
use crate::render::{MarkerVisual, NodeId, RenderSurface};
use crate::room::RoomDirectory;
use crate::xr::{
    AnchorId, FrameHandle, HitResult, ReferenceSpaceKind, SessionFeatures, XrFrame, XrPlatform,
    XrSession,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

pub(crate) struct FakeDirectory {
    /// `None` makes every fetch fail.
    pub payload: Option<String>,
    pub fetches: usize,
}

impl FakeDirectory {
    pub fn new(payload: &str) -> Self {
        Self {
            payload: Some(payload.to_owned()),
            fetches: 0,
        }
    }
}

impl RoomDirectory for FakeDirectory {
    fn fetch(&mut self) -> Result<String, DirectoryError> {
        self.fetches += 1;
        self.payload
            .clone()
            .ok_or_else(|| DirectoryError::Unavailable("offline".to_owned()))
    }
}

pub(crate) struct FakeSurface {
    pub ready: bool,
    pub nodes: HashMap<NodeId, (MarkerVisual, Coordinate<Scene>)>,
    pub camera: Pose<Scene>,
    pub fov: Angle,
    pub reticle: Option<Pose<Scene>>,
    pub compass: Option<CompassDial>,
    pub model_root: Option<Similarity<Scene, ModelLocal>>,
    pub renders: usize,
    next_node: u64,
}

impl FakeSurface {
    pub fn ready() -> Self {
        Self {
            ready: true,
            nodes: HashMap::new(),
            camera: Pose::default(),
            fov: Angle::new::<degree>(75.),
            reticle: None,
            compass: None,
            model_root: None,
            renders: 0,
            next_node: 0,
        }
    }

    pub fn not_ready() -> Self {
        Self {
            ready: false,
            ..Self::ready()
        }
    }
}

impl RenderSurface for FakeSurface {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn add_marker(&mut self, visual: &MarkerVisual, position: Coordinate<Scene>) -> NodeId {
        self.next_node += 1;
        let node = NodeId(self.next_node);
        self.nodes.insert(node, (visual.clone(), position));
        node
    }

    fn remove_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
    }

    fn set_node_position(&mut self, node: NodeId, position: Coordinate<Scene>) {
        if let Some((_, at)) = self.nodes.get_mut(&node) {
            *at = position;
        }
    }

    fn camera_pose(&self) -> Pose<Scene> {
        self.camera
    }

    fn set_camera_pose(&mut self, pose: Pose<Scene>) {
        self.camera = pose;
    }

    fn field_of_view(&self) -> Angle {
        self.fov
    }

    fn set_reticle(&mut self, pose: Option<Pose<Scene>>) {
        self.reticle = pose;
    }

    fn draw_compass(&mut self, dial: Option<&CompassDial>) {
        self.compass = dial.cloned();
    }

    fn set_model_transform(&mut self, root: Similarity<Scene, ModelLocal>) {
        self.model_root = Some(root);
    }

    fn render(&mut self) {
        self.renders += 1;
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FakeModel {
    vertices: Vec<[f64; 3]>,
}

impl FakeModel {
    pub fn new(vertices: Vec<[f64; 3]>) -> Self {
        Self { vertices }
    }
}

impl ModelHandle for FakeModel {
    fn vertices(&self) -> Vec<Coordinate<AssetLocal>> {
        self.vertices
            .iter()
            .map(|&[x, y, z]| {
                Coordinate::from_cartesian(
                    Length::new::<meter>(x),
                    Length::new::<meter>(y),
                    Length::new::<meter>(z),
                )
            })
            .collect()
    }
}

pub(crate) struct FakeLoader {
    failures_left: usize,
    model: FakeModel,
    pub requested: Vec<String>,
}

impl FakeLoader {
    pub fn new(model: FakeModel) -> Self {
        Self::failing(0, model)
    }

    /// Fails the first `failures` loads.
    pub fn failing(failures: usize, model: FakeModel) -> Self {
        Self {
            failures_left: failures,
            model,
            requested: Vec::new(),
        }
    }
}

impl AssetLoader for FakeLoader {
    fn load_model(&mut self, path: &str) -> Result<Box<dyn ModelHandle>, AssetError> {
        self.requested.push(path.to_owned());
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(AssetError::LoadFailed {
                path: path.to_owned(),
                reason: "connection reset".to_owned(),
            });
        }
        Ok(Box::new(self.model.clone()))
    }
}

/// Records every call the session makes into a log shared with the platform.
pub(crate) struct FakeXr {
    pub supported: bool,
    pub refuse: Option<SessionError>,
    pub requests: Vec<Vec<String>>,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl FakeXr {
    pub fn supported() -> Self {
        Self {
            supported: true,
            refuse: None,
            requests: Vec::new(),
            log: Rc::default(),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::supported()
        }
    }
}

impl XrPlatform for FakeXr {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn request_session(
        &mut self,
        features: &SessionFeatures,
    ) -> Result<Box<dyn XrSession>, SessionError> {
        self.requests.push(features.required.clone());
        if let Some(e) = &self.refuse {
            return Err(e.clone());
        }
        Ok(Box::new(FakeSession {
            log: Rc::clone(&self.log),
            next_frame: 0,
        }))
    }
}

struct FakeSession {
    log: Rc<RefCell<Vec<String>>>,
    next_frame: u64,
}

impl XrSession for FakeSession {
    fn request_reference_space(&mut self, kind: ReferenceSpaceKind) -> Result<(), SessionError> {
        self.log.borrow_mut().push(format!("reference-space {kind}"));
        Ok(())
    }

    fn request_hit_test_source(&mut self, space: ReferenceSpaceKind) -> Result<(), SessionError> {
        self.log.borrow_mut().push(format!("hit-test {space}"));
        Ok(())
    }

    fn request_animation_frame(&mut self) -> FrameHandle {
        self.next_frame += 1;
        self.log.borrow_mut().push(format!("frame {}", self.next_frame));
        FrameHandle(self.next_frame)
    }

    fn cancel_animation_frame(&mut self, handle: FrameHandle) {
        self.log.borrow_mut().push(format!("cancel {}", handle.0));
    }

    fn release(&mut self) {
        self.log.borrow_mut().push("release".to_owned());
    }

    fn end(&mut self) {
        self.log.borrow_mut().push("end".to_owned());
    }
}

pub(crate) struct FakeFrame {
    handle: FrameHandle,
    viewer: Option<Pose<Tracking>>,
    hits: Vec<HitResult>,
    anchors: HashMap<AnchorId, Pose<Tracking>>,
    refuse_anchors: bool,
}

impl FakeFrame {
    pub fn new(handle: FrameHandle) -> Self {
        Self {
            handle,
            viewer: None,
            hits: Vec::new(),
            anchors: HashMap::new(),
            refuse_anchors: false,
        }
    }

    pub fn viewer(mut self, pose: Pose<Tracking>) -> Self {
        self.viewer = Some(pose);
        self
    }

    pub fn hit(mut self, pose: Pose<Tracking>) -> Self {
        self.hits.push(HitResult { pose });
        self
    }

    /// Tracks `id` at `pose`. `create_anchor` hands out the lowest tracked id.
    pub fn anchor(mut self, id: AnchorId, pose: Pose<Tracking>) -> Self {
        self.anchors.insert(id, pose);
        self
    }

    pub fn refuse_anchors(mut self) -> Self {
        self.refuse_anchors = true;
        self
    }
}

impl XrFrame for FakeFrame {
    fn handle(&self) -> FrameHandle {
        self.handle
    }

    fn viewer_pose(&self) -> Option<Pose<Tracking>> {
        self.viewer
    }

    fn hit_test_results(&self) -> Vec<HitResult> {
        self.hits.clone()
    }

    fn create_anchor(&mut self, _hit: &HitResult) -> Result<AnchorId, SessionError> {
        if self.refuse_anchors {
            return Err(SessionError::RequestFailed("anchors unavailable".to_owned()));
        }
        Ok(self
            .anchors
            .keys()
            .min_by_key(|id| id.0)
            .copied()
            .unwrap_or(AnchorId(1)))
    }

    fn anchor_pose(&self, anchor: AnchorId) -> Option<Pose<Tracking>> {
        self.anchors.get(&anchor).copied()
    }
}

//! The two navigation markers and the compass that points at the destination.
//!
//! A marker's position is derived in three steps, always in this order:
//!
//! 1. the room's local position, from [`to_scene_position`];
//! 2. plus the manual debug offset, if one is configured;
//! 3. through the current [`MarkerBinding`] into the scene.
//!
//! The binding changes over the life of a navigation (the model is aligned, a session starts, the
//! visitor calibrates), so positions are re-derived from the rooms on every
//! [`MarkerManager::update_marker_positions`] rather than moved incrementally.

use crate::compass::{Compass, CompassDial, CompassReading};
use crate::coordinate_systems::{ModelLocal, Scene, SiteLocal, Tracking};
use crate::coordinates::Coordinate;
use crate::math::{RigidBodyTransform, Similarity};
use crate::render::{MarkerVisual, NodeId, RenderSurface};
use crate::retry::{Retrier, RetryPoll, RetryPolicy};
use crate::room::{NavigationPair, Room, RoomId};
use crate::transform::{to_scene_position, TransformConfig};
use crate::vectors::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uom::si::f64::Length;
use uom::si::length::meter;

pub const CURRENT_COLOR: u32 = 0x2196f3;
pub const DESTINATION_COLOR: u32 = 0x00ff00;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerRole {
    /// Where the visitor is.
    Current,
    /// Where the visitor is going.
    Destination,
}

impl MarkerRole {
    pub fn color(self) -> u32 {
        match self {
            MarkerRole::Current => CURRENT_COLOR,
            MarkerRole::Destination => DESTINATION_COLOR,
        }
    }
}

impl fmt::Display for MarkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerRole::Current => f.write_str("current"),
            MarkerRole::Destination => f.write_str("destination"),
        }
    }
}

/// How a marker's local position is carried into the scene.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum MarkerBinding {
    /// Local positions are used as scene positions directly.
    #[default]
    Unbound,
    /// Markers move with the model root.
    Model(Similarity<Scene, ModelLocal>),
    /// Markers are registered to a calibrated anchor in the session's reference space.
    Anchor(RigidBodyTransform<Tracking, SiteLocal>),
    /// Markers are shifted so that the localized room lands on the viewer.
    Offset(Vector<Scene>),
}

impl MarkerBinding {
    pub fn to_scene(&self, local: Coordinate<SiteLocal>) -> Coordinate<Scene> {
        match *self {
            MarkerBinding::Unbound => Coordinate::from_nalgebra_point(local.point),
            MarkerBinding::Model(root) => root * local.cast::<ModelLocal>(),
            MarkerBinding::Anchor(anchor) => (anchor * local).cast(),
            MarkerBinding::Offset(offset) => Coordinate::from_nalgebra_point(local.point) + offset,
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, MarkerBinding::Unbound)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Sphere radius, in meters.
    #[serde(default = "default_size")]
    pub size: f64,
    /// Label height above the sphere; `size × 1.6` when unset.
    #[serde(default)]
    pub label_height: Option<f64>,
    /// Manual offset added to every local marker position, for lining markers up by hand.
    #[serde(default)]
    pub debug_offset: Option<[f64; 3]>,
    /// Bind markers to the model root outside of an immersive session.
    #[serde(default = "default_bind_to_model")]
    pub bind_to_model: bool,
    #[serde(default = "default_placement_retry")]
    pub placement_retry: RetryPolicy,
}

fn default_size() -> f64 {
    0.3
}

fn default_bind_to_model() -> bool {
    true
}

fn default_placement_retry() -> RetryPolicy {
    RetryPolicy::new(10, 200)
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            label_height: None,
            debug_offset: None,
            bind_to_model: default_bind_to_model(),
            placement_retry: default_placement_retry(),
        }
    }
}

impl MarkerConfig {
    fn visual(&self, room: &Room, role: MarkerRole) -> MarkerVisual {
        MarkerVisual {
            label: room.marker_label(),
            color: role.color(),
            radius: Length::new::<meter>(self.size),
            label_height: Length::new::<meter>(self.label_height.unwrap_or(self.size * 1.6)),
        }
    }

    fn offset(&self) -> Vector<SiteLocal> {
        self.debug_offset.map_or_else(Vector::zero, |[x, y, z]| {
            Vector::from_nalgebra_vector(crate::Vector3::new(x, y, z))
        })
    }
}

/// A marker in the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneMarker {
    pub room_id: RoomId,
    pub role: MarkerRole,
    pub position: Coordinate<Scene>,
    pub node: NodeId,
    local: Coordinate<SiteLocal>,
}

/// What became of a marker placement request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Placed,
    /// The rendering surface is not ready; placement is retried on [`MarkerManager::poll`].
    Deferred,
    /// The rendering surface never became ready.
    Abandoned { attempts: u32 },
}

#[derive(Debug)]
struct PendingPlacement {
    pair: NavigationPair,
    retrier: Retrier,
}

/// Owns the markers for the current navigation pair and the compass.
///
/// At most one marker per [`MarkerRole`] exists at any time.
#[derive(Debug)]
pub struct MarkerManager {
    config: MarkerConfig,
    transform: TransformConfig,
    markers: Vec<SceneMarker>,
    pending: Option<PendingPlacement>,
    compass: Compass,
}

impl MarkerManager {
    pub fn new(config: MarkerConfig, transform: TransformConfig) -> Self {
        Self {
            config,
            transform,
            markers: Vec::with_capacity(2),
            pending: None,
            compass: Compass::new(),
        }
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    pub fn set_debug_offset(&mut self, offset: Option<[f64; 3]>) {
        self.config.debug_offset = offset;
    }

    pub fn transform_config(&self) -> &TransformConfig {
        &self.transform
    }

    pub fn set_transform_config(&mut self, transform: TransformConfig) {
        self.transform = transform;
    }

    pub fn markers(&self) -> &[SceneMarker] {
        &self.markers
    }

    pub fn marker(&self, role: MarkerRole) -> Option<&SceneMarker> {
        self.markers.iter().find(|m| m.role == role)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn compass(&self) -> &Compass {
        &self.compass
    }

    pub fn compass_mut(&mut self) -> &mut Compass {
        &mut self.compass
    }

    /// Where `room`'s marker goes in the scene under `binding`.
    pub fn scene_position(&self, room: &Room, binding: &MarkerBinding) -> Coordinate<Scene> {
        let local = to_scene_position(room, &self.transform) + self.config.offset();
        binding.to_scene(local)
    }

    /// Replaces the markers with one for each room of `pair`, and points the compass at the
    /// destination.
    ///
    /// The old markers are removed before the new ones are added, within this one call. If the
    /// surface is not ready yet the pair is remembered and placed by a later
    /// [`poll`](Self::poll).
    pub fn set_navigation_pair(
        &mut self,
        pair: &NavigationPair,
        binding: &MarkerBinding,
        surface: &mut dyn RenderSurface,
        now: Instant,
    ) -> Placement {
        self.clear(surface);

        if surface.is_ready() {
            self.place(pair, binding, surface);
            return Placement::Placed;
        }

        log::debug!("rendering surface not ready; deferring markers");
        let mut retrier = self.config.placement_retry.start();
        match retrier.poll(now, || None::<()>) {
            RetryPoll::Exhausted { attempts } => Placement::Abandoned { attempts },
            _ => {
                self.pending = Some(PendingPlacement {
                    pair: pair.clone(),
                    retrier,
                });
                Placement::Deferred
            }
        }
    }

    /// Retries a deferred placement if one is due.
    ///
    /// Returns `None` if nothing is waiting to be placed.
    pub fn poll(
        &mut self,
        binding: &MarkerBinding,
        surface: &mut dyn RenderSurface,
        now: Instant,
    ) -> Option<Placement> {
        let pending = self.pending.as_mut()?;
        match pending.retrier.poll(now, || surface.is_ready().then_some(())) {
            RetryPoll::Ready(()) => {
                let PendingPlacement { pair, .. } = self.pending.take()?;
                self.place(&pair, binding, surface);
                Some(Placement::Placed)
            }
            RetryPoll::Pending => Some(Placement::Deferred),
            RetryPoll::Exhausted { attempts } => {
                log::warn!("gave up placing markers after {attempts} attempts");
                self.pending = None;
                Some(Placement::Abandoned { attempts })
            }
        }
    }

    fn place(
        &mut self,
        pair: &NavigationPair,
        binding: &MarkerBinding,
        surface: &mut dyn RenderSurface,
    ) {
        for (room, role) in [
            (pair.current(), MarkerRole::Current),
            (pair.destination(), MarkerRole::Destination),
        ] {
            let local = to_scene_position(room, &self.transform);
            let position = binding.to_scene(local + self.config.offset());
            let node = surface.add_marker(&self.config.visual(room, role), position);
            log::debug!("{role} marker for room {} at {position}", room.id);
            self.markers.push(SceneMarker {
                room_id: room.id,
                role,
                position,
                node,
                local,
            });
        }
        if let Some(destination) = self.marker(MarkerRole::Destination) {
            let target = destination.position;
            self.compass.set_target(target);
        }
    }

    /// Re-derives every marker's scene position under `binding`.
    ///
    /// Rooms are looked up by id in `rooms` so that a refreshed room list is picked up; a marker
    /// whose room has disappeared keeps its last local position. The compass follows the
    /// destination marker.
    pub fn update_marker_positions(
        &mut self,
        rooms: &[Room],
        binding: &MarkerBinding,
        surface: &mut dyn RenderSurface,
    ) {
        let offset = self.config.offset();
        for marker in &mut self.markers {
            if let Some(room) = rooms.iter().find(|r| r.id == marker.room_id) {
                marker.local = to_scene_position(room, &self.transform);
            }
            marker.position = binding.to_scene(marker.local + offset);
            surface.set_node_position(marker.node, marker.position);
        }
        if let Some(target) = self.marker(MarkerRole::Destination).map(|m| m.position) {
            if self.compass.target() != Some(target) {
                self.compass.retarget(target);
            }
        }
    }

    /// Updates and draws the compass for the rendered frame `frame`.
    ///
    /// Does nothing until the surface is ready and a destination is set.
    pub fn update_compass(
        &mut self,
        frame: u64,
        surface: &mut dyn RenderSurface,
    ) -> Option<CompassReading> {
        if !surface.is_ready() {
            return None;
        }
        let camera = surface.camera_pose();
        let reading = self.compass.update(frame, Some(&camera)).copied();
        surface.draw_compass(reading.as_ref().map(CompassDial::new).as_ref());
        reading
    }

    /// Removes every marker, drops any deferred placement, and resets the compass.
    pub fn clear(&mut self, surface: &mut dyn RenderSurface) {
        for marker in self.markers.drain(..) {
            surface.remove_node(marker.node);
        }
        self.pending = None;
        self.compass.clear();
        if surface.is_ready() {
            surface.draw_compass(None);
        }
    }
}

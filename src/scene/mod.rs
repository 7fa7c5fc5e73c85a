//! Scene graph: an arena of nodes linked into a tree under one root.
//!
//! Nodes are addressed by [`NodeId`]; slots of removed nodes are reused.
//! The scene keeps a flat list of every
//! attached, non-camera node for the renderer, plus queues of nodes added to
//! and removed from that list since the renderer last looked.

pub mod camera;
pub mod mesh;
pub mod object;

pub use camera::Camera;
pub use mesh::Mesh;
pub use object::{NodeId, Object3D, Transformable3D};

use crate::error::SceneError;
use crate::geometry::GeometryId;
use crate::math::Matrix4;

/// The closed set of things a scene can hold.
#[derive(Debug, Clone)]
pub enum Node {
    Group(Object3D),
    Mesh(Mesh),
    Camera(Camera),
}

impl Node {
    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Node::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match self {
            Node::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, Node::Camera(_))
    }
}

impl Transformable3D for Node {
    fn object3d(&self) -> &Object3D {
        match self {
            Node::Group(o) => o,
            Node::Mesh(m) => m.object3d(),
            Node::Camera(c) => c.object3d(),
        }
    }

    fn object3d_mut(&mut self) -> &mut Object3D {
        match self {
            Node::Group(o) => o,
            Node::Mesh(m) => m.object3d_mut(),
            Node::Camera(c) => c.object3d_mut(),
        }
    }
}

impl From<Object3D> for Node {
    fn from(o: Object3D) -> Self {
        Node::Group(o)
    }
}

impl From<Mesh> for Node {
    fn from(m: Mesh) -> Self {
        Node::Mesh(m)
    }
}

impl From<Camera> for Node {
    fn from(c: Camera) -> Self {
        Node::Camera(c)
    }
}

const ROOT: NodeId = NodeId { index: 0, generation: 0 };

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<usize>,
    objects: Vec<NodeId>,
    objects_added: Vec<NodeId>,
    objects_removed: Vec<NodeId>,
    geometries_released: Vec<GeometryId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut root = Object3D::new();
        root.name = "scene".into();
        root.matrix_auto_update = false;
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::Group(root)),
            }],
            free: Vec::new(),
            objects: Vec::new(),
            objects_added: Vec::new(),
            objects_removed: Vec::new(),
            geometries_released: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Stores a node without attaching it anywhere. Slots freed by
    /// [`Scene::remove_node`] are filled first.
    pub fn insert(&mut self, node: impl Into<Node>) -> NodeId {
        let node = Some(node.into());
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = node;
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot { generation: 0, node });
        NodeId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Stores a node and attaches it directly under the root.
    pub fn add_object(&mut self, node: impl Into<Node>) -> NodeId {
        let id = self.insert(node);
        self.attach(ROOT, id);
        id
    }

    /// Drops `id` and its whole subtree and frees their slots.
    ///
    /// Handles to the dropped nodes stop resolving. Geometries of dropped
    /// meshes are queued for [`Scene::take_geometries_released`].
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.check(id)?;
        if id == ROOT {
            return Err(SceneError::RemoveRoot);
        }

        let was_attached = self.is_attached(id);
        self.unlink(id);
        if was_attached {
            self.unregister_subtree(id);
        }

        for n in self.subtree(id) {
            self.objects_removed.retain(|&r| r != n);
            let slot = &mut self.slots[n.index];
            if let Some(Node::Mesh(mesh)) = slot.node.take() {
                self.geometries_released.push(mesh.geometry().id());
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(n.index);
        }
        Ok(())
    }

    /// Live nodes, the root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Number of slots ever allocated; stays flat while removed nodes are
    /// replaced by new ones.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn object(&self, id: NodeId) -> Option<&Object3D> {
        self.node(id).map(|n| n.object3d())
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut Object3D> {
        self.node_mut(id).map(|n| n.object3d_mut())
    }

    pub fn mesh(&self, id: NodeId) -> Option<&Mesh> {
        self.node(id).and_then(Node::as_mesh)
    }

    pub fn mesh_mut(&mut self, id: NodeId) -> Option<&mut Mesh> {
        self.node_mut(id).and_then(Node::as_mesh_mut)
    }

    /// Attached non-camera nodes, in registration order.
    pub fn objects(&self) -> &[NodeId] {
        &self.objects
    }

    pub fn take_objects_added(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.objects_added)
    }

    pub fn take_objects_removed(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.objects_removed)
    }

    /// Geometries whose meshes were dropped by [`Scene::remove_node`].
    pub fn take_geometries_released(&mut self) -> Vec<GeometryId> {
        std::mem::take(&mut self.geometries_released)
    }

    /// Whether `id` hangs below the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ROOT {
                return true;
            }
            current = self.object(c).and_then(|o| o.parent);
        }
        false
    }

    /// Moves `child` under `parent`, detaching it from its previous parent.
    ///
    /// Attaching a subtree to the scene registers every non-camera node in
    /// it; moving a subtree out unregisters it.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.check(parent)?;
        self.check(child)?;

        let mut ancestor = Some(parent);
        while let Some(a) = ancestor {
            if a == child {
                return Err(SceneError::Cycle {
                    parent: parent.index,
                    child: child.index,
                });
            }
            ancestor = self.object(a).and_then(|o| o.parent);
        }

        let was_attached = self.is_attached(child);
        self.unlink(child);
        self.link(parent, child);
        let now_attached = self.is_attached(child);

        match (was_attached, now_attached) {
            (false, true) => self.register_subtree(child),
            (true, false) => self.unregister_subtree(child),
            _ => {}
        }
        Ok(())
    }

    /// Detaches `child` from `parent`. The node stays stored and can be
    /// attached again; use [`Scene::remove_node`] to drop it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.check(parent)?;
        self.check(child)?;
        if self.object(child).and_then(|o| o.parent) != Some(parent) {
            return Err(SceneError::NotAChild(child.index));
        }
        let was_attached = self.is_attached(child);
        self.unlink(child);
        if was_attached {
            self.unregister_subtree(child);
        }
        Ok(())
    }

    /// Depth-first world-matrix update from the root.
    ///
    /// A node that recomputes its world matrix forces the recompute on its
    /// whole subtree. Camera nodes that cannot invert their world matrix are
    /// logged and skipped.
    pub fn update(&mut self) {
        let mut stack: Vec<(NodeId, Option<Matrix4>, bool)> = vec![(ROOT, None, false)];

        while let Some((id, parent_world, force)) = stack.pop() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            let changed = match &mut *node {
                Node::Camera(camera) => match camera.update(parent_world.as_ref(), force) {
                    Ok(changed) => changed,
                    Err(err) => {
                        log::warn!("camera node {}: {err}", id.index);
                        true
                    }
                },
                other => other.object3d_mut().update(parent_world.as_ref(), force),
            };

            let world = *node.matrix_world();
            for &child in node.object3d().children.iter().rev() {
                stack.push((child, Some(world), force || changed));
            }
        }
    }

    fn check(&self, id: NodeId) -> Result<(), SceneError> {
        match self.node(id) {
            Some(_) => Ok(()),
            None => Err(SceneError::UnknownNode(id.index)),
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.link(parent, child);
        if self.is_attached(child) {
            self.register_subtree(child);
        }
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(object) = self.object_mut(child) {
            object.parent = Some(parent);
            object.mark_world_dirty();
        }
        if let Some(object) = self.object_mut(parent) {
            object.children.push(child);
        }
    }

    fn unlink(&mut self, child: NodeId) {
        let Some(object) = self.object_mut(child) else {
            return;
        };
        if let Some(old) = object.parent.take() {
            object.mark_world_dirty();
            if let Some(parent) = self.object_mut(old) {
                parent.children.retain(|&c| c != child);
            }
        }
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            if let Some(object) = self.object(n) {
                stack.extend(object.children.iter().rev());
            }
        }
        out
    }

    fn register_subtree(&mut self, id: NodeId) {
        for n in self.subtree(id) {
            let is_camera = self.node(n).map_or(true, Node::is_camera);
            if is_camera || self.objects.contains(&n) {
                continue;
            }
            self.objects.push(n);
            self.objects_removed.retain(|&r| r != n);
            self.objects_added.push(n);
        }
    }

    fn unregister_subtree(&mut self, id: NodeId) {
        for n in self.subtree(id) {
            if let Some(i) = self.objects.iter().position(|&o| o == n) {
                self.objects.remove(i);
                self.objects_added.retain(|&a| a != n);
                self.objects_removed.push(n);
            }
        }
    }
}

//! Arena-based bounding volume trees over mesh triangles.
//!
//! Nodes live in a flat arena and reference their children by index. Trees
//! are built with an explicit work stack, splitting each node along the
//! longest axis of its bounding volume at the median triangle centroid.
//! Construction depth is capped; a node at the cap becomes a leaf regardless
//! of its size.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::CollisionConfig;
use crate::math::{Point3, Vec3};
use crate::mesh::{MeshId, TriMesh};

/// A volume that can enclose a set of mesh triangles.
pub trait BoundingVolume: Clone {
    /// Smallest volume of this kind (as fitted) enclosing the given triangles.
    ///
    /// Called with an empty slice only for an empty mesh.
    fn enclose(mesh: &TriMesh, triangles: &[u32]) -> Self;

    /// Unit direction along which the node is split.
    fn split_direction(&self) -> Vec3;
}

/// A tree node: a leaf holding triangle indices or an internal node with two
/// children. Every node's volume contains all of its descendants' triangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode<B> {
    /// Leaf node containing triangle indices.
    Leaf {
        /// Volume of the leaf's triangles.
        bounds: B,
        /// Triangle indices into the source mesh.
        triangles: Vec<u32>,
    },
    /// Internal node with two children.
    Internal {
        /// Volume enclosing both children.
        bounds: B,
        /// Arena index of the left child.
        left: u32,
        /// Arena index of the right child.
        right: u32,
    },
}

impl<B> TreeNode<B> {
    /// The node's bounding volume.
    pub fn bounds(&self) -> &B {
        match self {
            TreeNode::Leaf { bounds, .. } | TreeNode::Internal { bounds, .. } => bounds,
        }
    }

    /// Whether this is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }
}

/// A bounding volume tree for one mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingTree<B> {
    pub(crate) mesh_id: MeshId,
    pub(crate) nodes: Vec<TreeNode<B>>,
    pub(crate) depth: usize,
}

struct BuildTask {
    node: u32,
    start: usize,
    end: usize,
    depth: usize,
}

impl<B: BoundingVolume> BoundingTree<B> {
    /// Build using the leaf size and depth cap from `config`.
    pub fn build(mesh: &TriMesh, config: &CollisionConfig) -> Self {
        Self::build_with(mesh, config.leaf_size, config.max_depth)
    }

    /// Build with an explicit leaf size and depth cap.
    pub fn build_with(mesh: &TriMesh, leaf_size: usize, max_depth: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let centroids: Vec<Point3> = mesh.triangles().map(|t| t.centroid()).collect();

        if centroids.is_empty() {
            return Self {
                mesh_id: mesh.id(),
                nodes: vec![TreeNode::Leaf {
                    bounds: B::enclose(mesh, &[]),
                    triangles: Vec::new(),
                }],
                depth: 0,
            };
        }

        let mut order: Vec<u32> = (0..centroids.len() as u32).collect();
        let mut nodes: Vec<Option<TreeNode<B>>> = vec![None];
        let mut stack = vec![BuildTask {
            node: 0,
            start: 0,
            end: order.len(),
            depth: 0,
        }];
        let mut max_seen = 0;

        while let Some(task) = stack.pop() {
            max_seen = max_seen.max(task.depth);
            let slice = &mut order[task.start..task.end];
            let bounds = B::enclose(mesh, slice);

            let count = slice.len();
            if count <= leaf_size || task.depth >= max_depth {
                if count > leaf_size {
                    trace!("depth cap {max_depth} forced a leaf of {count} triangles");
                }
                nodes[task.node as usize] = Some(TreeNode::Leaf {
                    bounds,
                    triangles: slice.to_vec(),
                });
                continue;
            }

            let dir = bounds.split_direction();
            let half = count / 2;
            slice.select_nth_unstable_by(half, |a, b| {
                let ka = centroids[*a as usize].coords.dot(&dir);
                let kb = centroids[*b as usize].coords.dot(&dir);
                ka.total_cmp(&kb)
            });

            let left = nodes.len() as u32;
            let right = left + 1;
            nodes.push(None);
            nodes.push(None);
            nodes[task.node as usize] = Some(TreeNode::Internal {
                bounds,
                left,
                right,
            });

            let mid = task.start + half;
            stack.push(BuildTask {
                node: right,
                start: mid,
                end: task.end,
                depth: task.depth + 1,
            });
            stack.push(BuildTask {
                node: left,
                start: task.start,
                end: mid,
                depth: task.depth + 1,
            });
        }

        // Every slot pushed above is filled by exactly one task.
        let nodes: Vec<TreeNode<B>> = nodes.into_iter().flatten().collect();

        debug!(
            "built tree for mesh {}: {} triangles, {} nodes, depth {}",
            mesh.id().raw(),
            centroids.len(),
            nodes.len(),
            max_seen
        );

        Self {
            mesh_id: mesh.id(),
            nodes,
            depth: max_seen,
        }
    }
}

impl<B> BoundingTree<B> {
    /// Id of the mesh this tree was built for.
    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    /// All nodes; index 0 is the root.
    pub fn nodes(&self) -> &[TreeNode<B>] {
        &self.nodes
    }

    /// The root node.
    pub fn root(&self) -> &TreeNode<B> {
        &self.nodes[0]
    }

    /// Volume of the whole mesh.
    pub fn root_bounds(&self) -> &B {
        self.root().bounds()
    }

    /// Deepest level reached during construction.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Node at arena index `i`.
    pub(crate) fn node(&self, i: u32) -> &TreeNode<B> {
        &self.nodes[i as usize]
    }

    /// All triangles stored under node `i`.
    pub fn triangles_under(&self, i: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![i];
        while let Some(n) = stack.pop() {
            match self.node(n) {
                TreeNode::Leaf { triangles, .. } => out.extend_from_slice(triangles),
                TreeNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        out
    }
}

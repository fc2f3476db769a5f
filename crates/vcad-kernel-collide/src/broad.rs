//! Broad phase: candidate triangle pairs from simultaneous tree traversal.
//!
//! Candidates are conservative. Every pair of triangles whose bounds overlap
//! shows up, plus some that do not; the narrow phase filters the rest.

use crate::aabb::Aabb;
use crate::bvh::Bvh;
use crate::math::Pose;
use crate::obb::{Obb, ObbTree};
use crate::tree::{BoundingTree, TreeNode};

/// A candidate pair: triangle index in the first mesh, triangle index in the second.
pub type CandidatePair = (u32, u32);

/// Candidate triangle pairs between two axis-aligned BVHs.
pub fn bvh_pairs(a: &Bvh, b: &Bvh) -> Vec<CandidatePair> {
    traverse(a, b, Aabb::overlaps, |x, y| aabb_volume(x) >= aabb_volume(y))
}

/// Candidate triangle pairs between a posed OBB-tree and an axis-aligned BVH.
///
/// `pose` places the OBB-tree's (local-frame) mesh in the BVH's frame.
pub fn obb_tree_pairs(tree: &ObbTree, pose: &Pose, bvh: &Bvh) -> Vec<CandidatePair> {
    traverse(
        tree,
        bvh,
        |obb, aabb| obb.transformed(pose).intersects(&Obb::from_aabb(aabb)),
        |obb, aabb| 8.0 * obb.half_extents.product() >= aabb_volume(aabb),
    )
}

fn aabb_volume(b: &Aabb) -> f64 {
    b.extents().product()
}

/// Simultaneous depth-first descent. When both nodes are internal the one
/// for which `split_a` says "bigger" is opened first.
fn traverse<A, B>(
    a: &BoundingTree<A>,
    b: &BoundingTree<B>,
    overlap: impl Fn(&A, &B) -> bool,
    split_a: impl Fn(&A, &B) -> bool,
) -> Vec<CandidatePair> {
    let mut out = Vec::new();
    let mut stack = vec![(0u32, 0u32)];

    while let Some((ia, ib)) = stack.pop() {
        let na = a.node(ia);
        let nb = b.node(ib);
        if !overlap(na.bounds(), nb.bounds()) {
            continue;
        }
        match (na, nb) {
            (TreeNode::Leaf { triangles: ta, .. }, TreeNode::Leaf { triangles: tb, .. }) => {
                for &x in ta {
                    for &y in tb {
                        out.push((x, y));
                    }
                }
            }
            (TreeNode::Internal { left, right, .. }, TreeNode::Leaf { .. }) => {
                stack.push((*right, ib));
                stack.push((*left, ib));
            }
            (TreeNode::Leaf { .. }, TreeNode::Internal { left, right, .. }) => {
                stack.push((ia, *right));
                stack.push((ia, *left));
            }
            (
                TreeNode::Internal {
                    bounds: ba,
                    left: la,
                    right: ra,
                },
                TreeNode::Internal {
                    bounds: bb,
                    left: lb,
                    right: rb,
                },
            ) => {
                if split_a(ba, bb) {
                    stack.push((*ra, ib));
                    stack.push((*la, ib));
                } else {
                    stack.push((ia, *rb));
                    stack.push((ia, *lb));
                }
            }
        }
    }
    out
}

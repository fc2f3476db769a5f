//! Per-mesh cache of bounding volume trees.
//!
//! Trees are built lazily and keyed by [`MeshId`]. Because a mesh is
//! immutable, a cached tree stays valid for the mesh's lifetime; a mesh with
//! new data has a new id and therefore gets a new tree. Trees for meshes that
//! drop out of use stay until [`BvhCache::retain`] or [`BvhCache::clear`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::bvh::Bvh;
use crate::config::CollisionConfig;
use crate::mesh::{MeshId, TriMesh};
use crate::obb::ObbTree;

/// Lazily built AABB-BVHs and OBB-trees, keyed by mesh identity.
#[derive(Debug, Default)]
pub struct BvhCache {
    leaf_size: usize,
    max_depth: usize,
    bvhs: HashMap<MeshId, Arc<Bvh>>,
    obb_trees: HashMap<MeshId, Arc<ObbTree>>,
}

impl BvhCache {
    /// Empty cache building trees with the settings in `config`.
    pub fn new(config: &CollisionConfig) -> Self {
        Self {
            leaf_size: config.leaf_size,
            max_depth: config.max_depth,
            bvhs: HashMap::new(),
            obb_trees: HashMap::new(),
        }
    }

    /// The AABB-BVH for `mesh`, building it on first use.
    pub fn get_or_build(&mut self, mesh: &TriMesh) -> Arc<Bvh> {
        let (leaf_size, max_depth) = (self.leaf_size, self.max_depth);
        self.bvhs
            .entry(mesh.id())
            .or_insert_with(|| Arc::new(Bvh::build_with(mesh, leaf_size, max_depth)))
            .clone()
    }

    /// The OBB-tree for `mesh` (in the mesh's own frame), building it on first use.
    pub fn get_or_build_obb(&mut self, mesh: &TriMesh) -> Arc<ObbTree> {
        let (leaf_size, max_depth) = (self.leaf_size, self.max_depth);
        self.obb_trees
            .entry(mesh.id())
            .or_insert_with(|| Arc::new(ObbTree::build_with(mesh, leaf_size, max_depth)))
            .clone()
    }

    /// Cached AABB-BVH for `id`, if any.
    pub fn get(&self, id: MeshId) -> Option<Arc<Bvh>> {
        self.bvhs.get(&id).cloned()
    }

    /// Build AABB-BVHs for several meshes on the rayon pool.
    ///
    /// Each distinct mesh is built exactly once; duplicates in `meshes` and
    /// meshes already cached are skipped, so no two workers ever build the
    /// same tree.
    pub fn prebuild_parallel(&mut self, meshes: &[&TriMesh]) {
        let mut seen = BTreeSet::new();
        let todo: Vec<&TriMesh> = meshes
            .iter()
            .copied()
            .filter(|m| !self.bvhs.contains_key(&m.id()) && seen.insert(m.id()))
            .collect();
        if todo.is_empty() {
            return;
        }

        let (leaf_size, max_depth) = (self.leaf_size, self.max_depth);
        let built: Vec<(MeshId, Bvh)> = todo
            .par_iter()
            .map(|m| (m.id(), Bvh::build_with(m, leaf_size, max_depth)))
            .collect();

        debug!("prebuilt {} BVHs in parallel", built.len());
        for (id, bvh) in built {
            self.bvhs.insert(id, Arc::new(bvh));
        }
    }

    /// Number of cached AABB-BVHs.
    pub fn len(&self) -> usize {
        self.bvhs.len()
    }

    /// True if no AABB-BVH is cached.
    pub fn is_empty(&self) -> bool {
        self.bvhs.is_empty()
    }

    /// Drop cached trees for every mesh not in `keep`.
    pub fn retain(&mut self, keep: &BTreeSet<MeshId>) {
        let before = self.bvhs.len() + self.obb_trees.len();
        self.bvhs.retain(|id, _| keep.contains(id));
        self.obb_trees.retain(|id, _| keep.contains(id));
        let evicted = before - self.bvhs.len() - self.obb_trees.len();
        if evicted > 0 {
            debug!("evicted {evicted} cached trees");
        }
    }

    /// Drop every cached tree.
    pub fn clear(&mut self) {
        self.bvhs.clear();
        self.obb_trees.clear();
    }
}

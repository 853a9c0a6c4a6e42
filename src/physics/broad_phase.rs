use nalgebra::Vector3;

use super::aabb::Aabb;
use crate::utils::constants::AABB_MARGIN;

pub const NULL_NODE: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Node {
    fat: Aabb,
    parent: u32,
    children: [u32; 2],
    /// Collider index for leaves, `NULL_NODE` for internal nodes.
    collider: u32,
    children_crossed: bool,
}

impl Node {
    fn leaf(fat: Aabb, collider: u32) -> Self {
        Self {
            fat,
            parent: NULL_NODE,
            children: [NULL_NODE, NULL_NODE],
            collider,
            children_crossed: false,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL_NODE
    }
}

/// Dynamic AABB tree over collider leaves.
///
/// Nodes live in an arena addressed by stable indices with a free list;
/// parent/child links are indices, never pointers. Leaves store fat AABBs
/// (tight bounds inflated by `margin`) so that small motions do not disturb
/// the tree structure.
pub struct AabbTree {
    nodes: Vec<Node>,
    free: Vec<u32>,
    root: u32,
    margin: f32,
    pairs: Vec<(u32, u32)>,
}

impl AabbTree {
    pub fn new() -> Self {
        Self::with_margin(AABB_MARGIN)
    }

    pub fn with_margin(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NULL_NODE,
            margin: margin.max(0.0),
            pairs: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root == NULL_NODE
    }

    #[inline]
    pub fn margin(&self) -> f32 {
        self.margin
    }

    fn alloc(&mut self, node: Node) -> u32 {
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = node;
            index
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn release(&mut self, index: u32) {
        self.free.push(index);
    }

    /// Insert a leaf for `collider` with the given tight bounds.
    pub fn insert(&mut self, tight: &Aabb, collider: u32) -> u32 {
        let fat = tight.inflated(self.margin);
        let leaf = self.alloc(Node::leaf(fat, collider));
        self.insert_leaf(leaf);
        leaf
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Descend into the child whose fat box grows least.
        let leaf_fat = self.nodes[leaf as usize].fat;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let [left, right] = self.nodes[index as usize].children;
            let left_fat = self.nodes[left as usize].fat;
            let right_fat = self.nodes[right as usize].fat;

            let left_growth = left_fat.union(&leaf_fat).volume() - left_fat.volume();
            let right_growth = right_fat.union(&leaf_fat).volume() - right_fat.volume();

            index = if left_growth < right_growth { left } else { right };
        }

        // Split the reached leaf with a new branch node.
        let sibling = index;
        let old_parent = self.nodes[sibling as usize].parent;
        let branch_fat = self.nodes[sibling as usize].fat.union(&leaf_fat);
        let branch = self.alloc(Node {
            fat: branch_fat,
            parent: old_parent,
            children: [sibling, leaf],
            collider: NULL_NODE,
            children_crossed: false,
        });

        self.nodes[sibling as usize].parent = branch;
        self.nodes[leaf as usize].parent = branch;

        if old_parent == NULL_NODE {
            self.root = branch;
        } else {
            let parent = &mut self.nodes[old_parent as usize];
            if parent.children[0] == sibling {
                parent.children[0] = branch;
            } else {
                parent.children[1] = branch;
            }
        }

        self.refit_upward(branch);
    }

    fn refit_upward(&mut self, mut index: u32) {
        while index != NULL_NODE {
            let node = &self.nodes[index as usize];
            if !node.is_leaf() {
                let [left, right] = node.children;
                let fat = self.nodes[left as usize]
                    .fat
                    .union(&self.nodes[right as usize].fat);
                self.nodes[index as usize].fat = fat;
            }
            index = self.nodes[index as usize].parent;
        }
    }

    /// Remove a leaf and free its node.
    pub fn remove(&mut self, leaf: u32) {
        self.detach_leaf(leaf);
        self.release(leaf);
    }

    /// Unlink a leaf from the tree structure but keep its node allocated.
    fn detach_leaf(&mut self, leaf: u32) {
        let parent = self.nodes[leaf as usize].parent;

        if parent == NULL_NODE {
            // Leaf was the root.
            self.root = NULL_NODE;
            return;
        }

        let grandparent = self.nodes[parent as usize].parent;
        let [left, right] = self.nodes[parent as usize].children;
        let sibling = if left == leaf { right } else { left };

        if grandparent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
        } else {
            let g = &mut self.nodes[grandparent as usize];
            if g.children[0] == parent {
                g.children[0] = sibling;
            } else {
                g.children[1] = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.refit_upward(grandparent);
        }

        self.release(parent);
        self.nodes[leaf as usize].parent = NULL_NODE;
    }

    /// Refresh a leaf with new tight bounds. A tight box still inside the
    /// fat box is a no-op; otherwise the leaf is re-inserted with fresh
    /// margins. Returns whether the tree changed.
    pub fn update(&mut self, leaf: u32, tight: &Aabb) -> bool {
        if self.nodes[leaf as usize].fat.contains_aabb(tight) {
            return false;
        }
        self.detach_leaf(leaf);
        self.nodes[leaf as usize].fat = tight.inflated(self.margin);
        self.insert_leaf(leaf);
        true
    }

    /// Rewrite the collider index stored on a leaf (after a swap-erase in
    /// the collider arena displaced it).
    pub fn set_leaf_collider(&mut self, leaf: u32, collider: u32) {
        self.nodes[leaf as usize].collider = collider;
    }

    /// All unordered leaf pairs whose fat AABBs overlap, as collider index
    /// pairs. Single traversal; each branch crosses its children once.
    pub fn pairs(&mut self) -> &[(u32, u32)] {
        self.pairs.clear();

        if self.root == NULL_NODE || self.nodes[self.root as usize].is_leaf() {
            return &self.pairs;
        }

        self.clear_crossed_flags(self.root);
        let [left, right] = self.nodes[self.root as usize].children;
        self.cross_pair(left, right);

        &self.pairs
    }

    fn clear_crossed_flags(&mut self, index: u32) {
        let node = &mut self.nodes[index as usize];
        node.children_crossed = false;
        if !node.is_leaf() {
            let [left, right] = node.children;
            self.clear_crossed_flags(left);
            self.clear_crossed_flags(right);
        }
    }

    fn cross_children(&mut self, index: u32) {
        if !self.nodes[index as usize].children_crossed {
            let [left, right] = self.nodes[index as usize].children;
            self.cross_pair(left, right);
            self.nodes[index as usize].children_crossed = true;
        }
    }

    fn cross_pair(&mut self, a: u32, b: u32) {
        let a_leaf = self.nodes[a as usize].is_leaf();
        let b_leaf = self.nodes[b as usize].is_leaf();

        if a_leaf && b_leaf {
            if self.nodes[a as usize].fat.overlaps(&self.nodes[b as usize].fat) {
                self.pairs.push((
                    self.nodes[a as usize].collider,
                    self.nodes[b as usize].collider,
                ));
            }
            return;
        }

        if a_leaf {
            self.cross_children(b);
            let [left, right] = self.nodes[b as usize].children;
            self.cross_pair(a, left);
            self.cross_pair(a, right);
            return;
        }

        if b_leaf {
            self.cross_children(a);
            let [left, right] = self.nodes[a as usize].children;
            self.cross_pair(left, b);
            self.cross_pair(right, b);
            return;
        }

        self.cross_children(a);
        self.cross_children(b);
        if !self.nodes[a as usize].fat.overlaps(&self.nodes[b as usize].fat) {
            return;
        }
        let [al, ar] = self.nodes[a as usize].children;
        let [bl, br] = self.nodes[b as usize].children;
        self.cross_pair(al, bl);
        self.cross_pair(al, br);
        self.cross_pair(ar, bl);
        self.cross_pair(ar, br);
    }

    /// Collider indices of all leaves overlapping `region`.
    pub fn query(&self, region: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        if self.root == NULL_NODE {
            return out;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !region.overlaps(&node.fat) {
                continue;
            }
            if node.is_leaf() {
                out.push(node.collider);
            } else {
                stack.push(node.children[0]);
                stack.push(node.children[1]);
            }
        }
        out
    }

    /// First leaf whose fat AABB contains `point`.
    pub fn pick(&self, point: &Vector3<f32>) -> Option<u32> {
        if self.root == NULL_NODE {
            return None;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.fat.contains_point(point) {
                continue;
            }
            if node.is_leaf() {
                return Some(node.collider);
            }
            stack.push(node.children[0]);
            stack.push(node.children[1]);
        }
        None
    }

    /// Nearest leaf along a ray, by the per-collider distance returned from
    /// `hit`. Branches whose slab interval opens beyond the current best are
    /// pruned.
    pub fn raycast<F>(
        &self,
        origin: &Vector3<f32>,
        dir: &Vector3<f32>,
        mut hit: F,
    ) -> Option<(u32, f32)>
    where
        F: FnMut(u32) -> Option<f32>,
    {
        if self.root == NULL_NODE {
            return None;
        }

        let mut best: Option<(u32, f32)> = None;
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            let entry = match node.fat.ray_intersect(origin, dir) {
                Some((t_min, _)) => t_min,
                None => continue,
            };
            if let Some((_, best_t)) = best {
                if entry > best_t {
                    continue;
                }
            }

            if node.is_leaf() {
                if let Some(t) = hit(node.collider) {
                    match best {
                        Some((_, best_t)) if t >= best_t => {}
                        _ => best = Some((node.collider, t)),
                    }
                }
            } else {
                stack.push(node.children[0]);
                stack.push(node.children[1]);
            }
        }

        best
    }

    /// Structural invariants: parent/child links are mutually consistent and
    /// every branch box contains its children. Used by tests.
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return true;
        }
        if self.nodes[self.root as usize].parent != NULL_NODE {
            return false;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.is_leaf() {
                continue;
            }
            for &child in &node.children {
                if self.nodes[child as usize].parent != index {
                    return false;
                }
                if !node.fat.contains_aabb(&self.nodes[child as usize].fat) {
                    return false;
                }
                stack.push(child);
            }
        }
        true
    }
}

impl Default for AabbTree {
    fn default() -> Self {
        Self::new()
    }
}

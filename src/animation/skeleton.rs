use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::math::Transform;

use super::pose::{self, Pose};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    Local,
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoneKind {
    /// no parent
    Root,
    /// exactly one child
    Joint,
    /// more than one child
    Branch,
    /// no children
    Leaf,
}

impl fmt::Display for BoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoneKind::Root => "ROOT",
            BoneKind::Joint => "JOINT",
            BoneKind::Branch => "BRANCH",
            BoneKind::Leaf => "LEAF",
        };
        f.write_str(s)
    }
}

/// Forest of bones. The model pose is a cache kept in sync with the local pose on every write.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    labels: Vec<String>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    local: Pose,
    model: Pose,
    /// parents before children
    order: Vec<usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a skeleton from per-bone child lists, the way rig files describe it.
    pub fn from_hierarchy(labels: Vec<String>, children: Vec<Vec<usize>>, local: Pose) -> Result<Self> {
        let n = labels.len();
        if children.len() != n || local.len() != n {
            return Err(EngineError::PoseSizeMismatch {
                expected: n,
                actual: if children.len() != n { children.len() } else { local.len() },
            });
        }

        let mut parents: Vec<Option<usize>> = vec![None; n];
        for (idx, kids) in children.iter().enumerate() {
            for &child in kids {
                if child >= n {
                    return Err(EngineError::InvalidBone { index: child, len: n });
                }
                if parents[child].is_some() {
                    return Err(EngineError::MultipleParents(child));
                }
                parents[child] = Some(idx);
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut stack: Vec<usize> = (0..n).rev().filter(|&i| parents[i].is_none()).collect();
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for &child in children[idx].iter().rev() {
                stack.push(child);
            }
        }
        // bones unreachable from any root sit on a cycle
        if order.len() != n {
            let mut seen = vec![false; n];
            for &idx in &order {
                seen[idx] = true;
            }
            let first = seen.iter().position(|s| !s).unwrap_or(0);
            return Err(EngineError::CyclicHierarchy(first));
        }

        let model = pose::to_model_space(&local, &parents, &order);
        Ok(Self {
            labels,
            parents,
            children,
            local,
            model,
            order,
        })
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn check(&self, i: usize) -> Result<()> {
        if i < self.size() {
            Ok(())
        } else {
            Err(EngineError::InvalidBone { index: i, len: self.size() })
        }
    }

    /// Appends a bone and returns its index. In model space the transform is
    /// converted to local space using the parent's current model transform.
    pub fn add_bone(
        &mut self,
        parent: Option<usize>,
        transform: Transform,
        space: SpaceType,
        label: impl Into<String>,
    ) -> Result<usize> {
        let (local, model) = match parent {
            None => (transform, transform),
            Some(p) => {
                self.check(p)?;
                let parent_model = self.model[p];
                match space {
                    SpaceType::Local => (transform, parent_model * transform),
                    SpaceType::Model => (parent_model.inverse() * transform, transform),
                }
            }
        };
        let idx = self.size();
        self.labels.push(label.into());
        self.parents.push(parent);
        self.children.push(Vec::new());
        if let Some(p) = parent {
            self.children[p].push(idx);
        }
        self.local.push(local);
        self.model.push(model);
        // the new bone's parent is already ordered
        self.order.push(idx);
        Ok(idx)
    }

    pub fn label(&self, i: usize) -> Result<&str> {
        self.check(i)?;
        Ok(&self.labels[i])
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn parent(&self, i: usize) -> Result<Option<usize>> {
        self.check(i)?;
        Ok(self.parents[i])
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    pub fn children(&self, i: usize) -> Result<&[usize]> {
        self.check(i)?;
        Ok(&self.children[i])
    }

    pub fn is_root(&self, i: usize) -> bool {
        self.parents.get(i).is_some_and(|p| p.is_none())
    }

    pub fn is_leaf(&self, i: usize) -> bool {
        self.children.get(i).is_some_and(|c| c.is_empty())
    }

    pub fn kind(&self, i: usize) -> Result<BoneKind> {
        self.check(i)?;
        Ok(if self.parents[i].is_none() {
            BoneKind::Root
        } else {
            match self.children[i].len() {
                0 => BoneKind::Leaf,
                1 => BoneKind::Joint,
                _ => BoneKind::Branch,
            }
        })
    }

    /// Bone indices with every parent listed before its children
    pub fn traversal_order(&self) -> &[usize] {
        &self.order
    }

    pub fn pose(&self, space: SpaceType) -> &Pose {
        match space {
            SpaceType::Local => &self.local,
            SpaceType::Model => &self.model,
        }
    }

    /// Panics if the pose does not have one transform per bone
    pub fn set_pose(&mut self, pose: &[Transform], space: SpaceType) {
        assert!(
            pose.len() == self.size(),
            "setting a pose of {} transforms on a skeleton of {} bones",
            pose.len(),
            self.size()
        );
        match space {
            SpaceType::Local => {
                self.local.copy_from_slice(pose);
                self.model = pose::to_model_space(&self.local, &self.parents, &self.order);
            }
            SpaceType::Model => {
                self.model.copy_from_slice(pose);
                for i in 0..self.size() {
                    self.local[i] = match self.parents[i] {
                        Some(p) => self.model[p].inverse() * self.model[i],
                        None => self.model[i],
                    };
                }
            }
        }
    }

    pub fn transform(&self, i: usize, space: SpaceType) -> Result<Transform> {
        self.check(i)?;
        Ok(self.pose(space)[i])
    }

    /// A local write moves the whole subtree. A model write keeps the
    /// children's model transforms fixed and rewrites their local ones instead.
    pub fn set_transform(&mut self, i: usize, t: Transform, space: SpaceType) -> Result<()> {
        self.check(i)?;
        match space {
            SpaceType::Local => {
                self.local[i] = t;
                self.model[i] = match self.parents[i] {
                    Some(p) => self.model[p] * t,
                    None => t,
                };
                let mut stack = vec![i];
                while let Some(parent) = stack.pop() {
                    for &child in &self.children[parent] {
                        self.model[child] = self.model[parent] * self.local[child];
                        stack.push(child);
                    }
                }
            }
            SpaceType::Model => {
                self.model[i] = t;
                self.local[i] = match self.parents[i] {
                    Some(p) => self.model[p].inverse() * t,
                    None => t,
                };
                let inv = t.inverse();
                for &child in &self.children[i] {
                    self.local[child] = inv * self.model[child];
                }
            }
        }
        Ok(())
    }

    /// Start is the bone origin, end the average origin of its children.
    /// Leaf bones have start == end.
    pub fn bone_points(&self, i: usize) -> Result<(Vec3, Vec3)> {
        self.check(i)?;
        let start = Vec3::from(self.model[i].translation);
        let children = &self.children[i];
        if children.is_empty() {
            return Ok((start, start));
        }
        let sum: Vec3 = children.iter().map(|&c| Vec3::from(self.model[c].translation)).sum();
        Ok((start, sum / children.len() as f32))
    }

    /// Unit bone direction, zero for zero-length bones
    pub fn bone_axis(&self, i: usize) -> Result<Vec3> {
        let (start, end) = self.bone_points(i)?;
        Ok((end - start).normalize_or_zero())
    }

    /// Closest point to `p` on the bone segment. Zero-length bones project onto their start.
    pub fn project_on_bone(&self, i: usize, p: Vec3) -> Result<Vec3> {
        let (start, end) = self.bone_points(i)?;
        let dir = end - start;
        Ok(start + project_on_segment(p, start, dir) * dir)
    }
}

/// Parameter in [0, 1] of the projection of `p` on the segment `a + t * ab`
pub fn project_on_segment(p: Vec3, a: Vec3, ab: Vec3) -> f32 {
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return 0.0;
    }
    ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
}

impl fmt::Display for Skeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.size() {
            let kind = self.kind(i).map_err(|_| fmt::Error)?;
            writeln!(f, "Bone {}\t: {}", i, self.labels[i])?;
            writeln!(f, "Type\t: {}", kind)?;
            match self.parents[i] {
                Some(p) => writeln!(f, "Parent\t: ({}) {}", p, self.labels[p])?,
                None => writeln!(f, "Parent\t: ")?,
            }
            writeln!(f, "Children#\t: {}", self.children[i].len())?;
            write!(f, "Children\t: ")?;
            for &c in &self.children[i] {
                write!(f, "({}) {} | ", c, self.labels[c])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

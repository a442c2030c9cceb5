use log::{info, warn};
use rayon::prelude::*;

use crate::error::{EngineError, Result};

/// Sparse vertex x bone influence matrix, stored row by row.
/// Entries inside a row are sorted by bone index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    row_offsets: Vec<usize>,
    bones: Vec<usize>,
    values: Vec<f32>,
}

impl WeightMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_offsets: vec![0; rows + 1],
            bones: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Duplicate (vertex, bone) entries are summed
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, f32)>,
    ) -> Result<Self> {
        let mut per_row: Vec<Vec<(usize, f32)>> = vec![Vec::new(); rows];
        for (vertex, bone, weight) in triplets {
            if vertex >= rows {
                return Err(EngineError::InvalidMesh(format!(
                    "weight for vertex {} but the mesh has {} vertices",
                    vertex, rows
                )));
            }
            if bone >= cols {
                return Err(EngineError::InvalidBone { index: bone, len: cols });
            }
            per_row[vertex].push((bone, weight));
        }

        let mut m = Self::new(rows, cols);
        for (vertex, mut entries) in per_row.into_iter().enumerate() {
            entries.sort_by_key(|(bone, _)| *bone);
            for (bone, weight) in entries {
                if m.bones.len() > m.row_offsets[vertex] && m.bones.last() == Some(&bone) {
                    if let Some(last) = m.values.last_mut() {
                        *last += weight;
                    }
                } else {
                    m.bones.push(bone);
                    m.values.push(weight);
                }
            }
            m.row_offsets[vertex + 1] = m.bones.len();
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// (bone indices, weights) of a vertex
    pub fn row(&self, vertex: usize) -> (&[usize], &[f32]) {
        let range = self.row_offsets[vertex]..self.row_offsets[vertex + 1];
        (&self.bones[range.clone()], &self.values[range])
    }

    pub fn row_iter(&self, vertex: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (bones, values) = self.row(vertex);
        bones.iter().copied().zip(values.iter().copied())
    }

    pub fn row_sum(&self, vertex: usize) -> f32 {
        self.row(vertex).1.iter().sum()
    }

    pub fn get(&self, vertex: usize, bone: usize) -> f32 {
        if vertex >= self.rows {
            return 0.0;
        }
        let (bones, values) = self.row(vertex);
        match bones.binary_search(&bone) {
            Ok(i) => values[i],
            Err(_) => 0.0,
        }
    }

    pub fn set(&mut self, vertex: usize, bone: usize, weight: f32) -> Result<()> {
        if vertex >= self.rows {
            return Err(EngineError::InvalidMesh(format!(
                "vertex {} out of range ({} vertices)",
                vertex, self.rows
            )));
        }
        if bone >= self.cols {
            return Err(EngineError::InvalidBone { index: bone, len: self.cols });
        }
        let start = self.row_offsets[vertex];
        let end = self.row_offsets[vertex + 1];
        match self.bones[start..end].binary_search(&bone) {
            Ok(i) => self.values[start + i] = weight,
            Err(i) => {
                self.bones.insert(start + i, bone);
                self.values.insert(start + i, weight);
                for offset in &mut self.row_offsets[vertex + 1..] {
                    *offset += 1;
                }
            }
        }
        Ok(())
    }

    /// Dense weights of one bone over all vertices
    pub fn bone_weights(&self, bone: usize) -> Vec<f32> {
        (0..self.rows).map(|v| self.get(v, bone)).collect()
    }

    fn rows_mut(&mut self) -> Vec<&mut [f32]> {
        let mut out = Vec::with_capacity(self.rows);
        let mut rest = self.values.as_mut_slice();
        for r in 0..self.rows {
            let len = self.row_offsets[r + 1] - self.row_offsets[r];
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
            out.push(head);
            rest = tail;
        }
        out
    }
}

fn normalize_row(row: &mut [f32], eps: f32) -> bool {
    let sum: f32 = row.iter().sum();
    if sum <= 0.0 || !sum.is_finite() || (sum - 1.0).abs() <= eps {
        return false;
    }
    let inv = 1.0 / sum;
    row.iter_mut().for_each(|w| *w *= inv);
    true
}

/// Rescales every row whose sum differs from 1 by more than `eps`.
/// Returns whether any row changed. Rows with no influence cannot be normalized:
/// the other rows are still processed and an error lists the unweighted vertices.
pub fn normalize_weights(m: &mut WeightMatrix, eps: f32, parallel: bool) -> Result<bool> {
    if let Some((vertex, bone)) = find_invalid_number(m, parallel) {
        return Err(EngineError::NonFiniteWeight { vertex, bone });
    }

    let changed = if parallel {
        m.rows_mut().into_par_iter().map(|row| normalize_row(row, eps)).filter(|c| *c).count()
    } else {
        m.rows_mut().into_iter().map(|row| normalize_row(row, eps)).filter(|c| *c).count()
    };
    if changed > 0 {
        info!("normalized {} of {} weight rows", changed, m.rows());
    }

    let unweighted = unweighted_vertices(m, parallel);
    if let Some(&first) = unweighted.first() {
        return Err(EngineError::UnweightedVertices {
            count: unweighted.len(),
            first,
        });
    }
    Ok(changed > 0)
}

/// Normalized copy, the input is left untouched
pub fn partition_of_unity(m: &WeightMatrix, eps: f32) -> Result<WeightMatrix> {
    let mut out = m.clone();
    normalize_weights(&mut out, eps, true)?;
    Ok(out)
}

fn find_invalid_number(m: &WeightMatrix, parallel: bool) -> Option<(usize, usize)> {
    let check_row = |v: usize| m.row_iter(v).find(|(_, w)| !w.is_finite()).map(|(b, _)| (v, b));
    if parallel {
        (0..m.rows()).into_par_iter().find_map_first(check_row)
    } else {
        (0..m.rows()).find_map(check_row)
    }
}

/// Vertices whose weight row sums to zero
pub fn unweighted_vertices(m: &WeightMatrix, parallel: bool) -> Vec<usize> {
    let unweighted = |v: &usize| m.row_sum(*v) == 0.0;
    if parallel {
        (0..m.rows()).into_par_iter().filter(unweighted).collect()
    } else {
        (0..m.rows()).filter(unweighted).collect()
    }
}

/// True iff no entry is NaN or infinite
pub fn check_invalid_numbers(m: &WeightMatrix, parallel: bool) -> bool {
    match find_invalid_number(m, parallel) {
        Some((vertex, bone)) => {
            warn!("non-finite weight at vertex {} bone {}", vertex, bone);
            false
        }
        None => true,
    }
}

/// True iff every vertex is influenced by at least one bone
pub fn check_no_weight_vertex(m: &WeightMatrix, parallel: bool) -> bool {
    let unweighted = unweighted_vertices(m, parallel);
    if let Some(first) = unweighted.first() {
        warn!("{} vertices have no weight, first is {}", unweighted.len(), first);
        return false;
    }
    true
}

/// Runs both checks. With `fail_on_assert` an invalid matrix panics.
pub fn check_weight_matrix(m: &WeightMatrix, fail_on_assert: bool, parallel: bool) -> bool {
    let valid_numbers = check_invalid_numbers(m, parallel);
    let all_weighted = check_no_weight_vertex(m, parallel);
    let ok = valid_numbers && all_weighted;
    if fail_on_assert {
        assert!(ok, "invalid weight matrix");
    }
    ok
}

/// Dominant bone of a vertex. Ties go to the lowest bone index.
pub fn get_max_weight_index(m: &WeightMatrix, vertex: usize) -> Option<usize> {
    if vertex >= m.rows() {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (bone, w) in m.row_iter(vertex) {
        match best {
            Some((_, bw)) if w <= bw => {}
            _ => best = Some((bone, w)),
        }
    }
    best.map(|(bone, _)| bone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn unnormalized() -> WeightMatrix {
        WeightMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 2.0), (0, 1, 2.0), (1, 1, 0.5), (2, 2, 0.3), (2, 0, 0.1)],
        )
        .unwrap()
    }

    #[test]
    fn triplets_sum_duplicates_and_sort() {
        let m = WeightMatrix::from_triplets(1, 4, vec![(0, 3, 0.25), (0, 1, 0.5), (0, 3, 0.25)]).unwrap();
        assert_eq!(m.row(0), (&[1usize, 3][..], &[0.5f32, 0.5][..]));
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn out_of_range_triplets_are_rejected() {
        assert!(WeightMatrix::from_triplets(2, 2, vec![(0, 2, 1.0)]).is_err());
        assert!(WeightMatrix::from_triplets(2, 2, vec![(5, 0, 1.0)]).is_err());
    }

    #[test_case(true ; "parallel")]
    #[test_case(false ; "sequential")]
    fn normalization_is_idempotent(parallel: bool) {
        let mut m = unnormalized();
        assert!(normalize_weights(&mut m, 1e-4, parallel).unwrap());
        for v in 0..m.rows() {
            assert!((m.row_sum(v) - 1.0).abs() < 1e-5);
        }
        let once = m.clone();
        assert!(!normalize_weights(&mut m, 1e-4, parallel).unwrap());
        assert_eq!(m, once);
    }

    #[test]
    fn zero_row_is_reported() {
        let mut m = WeightMatrix::from_triplets(3, 2, vec![(0, 0, 2.0), (2, 1, 1.0)]).unwrap();
        let err = normalize_weights(&mut m, 1e-4, true).unwrap_err();
        assert!(matches!(err, EngineError::UnweightedVertices { count: 1, first: 1 }));
        // valid rows were still normalized
        assert_eq!(m.get(0, 0), 1.0);
        assert!(m.values.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn partition_of_unity_leaves_input_untouched() {
        let m = unnormalized();
        let normalized = partition_of_unity(&m, 1e-4).unwrap();
        assert_eq!(m.get(0, 0), 2.0);
        assert_eq!(normalized.get(0, 0), 0.5);
    }

    #[test]
    fn nan_fails_the_check_until_fixed() {
        let mut m = unnormalized();
        m.set(1, 1, f32::NAN).unwrap();
        assert!(!check_weight_matrix(&m, false, true));
        assert!(!check_invalid_numbers(&m, false));
        m.set(1, 1, 0.5).unwrap();
        normalize_weights(&mut m, 1e-4, true).unwrap();
        assert!(check_weight_matrix(&m, false, true));
    }

    #[test]
    #[should_panic(expected = "invalid weight matrix")]
    fn failing_check_can_assert() {
        let m = WeightMatrix::from_triplets(2, 1, vec![(0, 0, 1.0)]).unwrap();
        check_weight_matrix(&m, true, false);
    }

    #[test]
    fn no_weight_vertex_check() {
        let m = WeightMatrix::from_triplets(2, 1, vec![(0, 0, 1.0)]).unwrap();
        assert!(check_invalid_numbers(&m, true));
        assert!(!check_no_weight_vertex(&m, true));
        assert_eq!(unweighted_vertices(&m, false), vec![1]);
    }

    #[test]
    fn set_inserts_new_entries() {
        let mut m = WeightMatrix::new(2, 3);
        m.set(1, 2, 0.4).unwrap();
        m.set(1, 0, 0.6).unwrap();
        m.set(0, 1, 1.0).unwrap();
        assert_eq!(m.row(1), (&[0usize, 2][..], &[0.6f32, 0.4][..]));
        assert_eq!(m.bone_weights(1), vec![1.0, 0.0]);
    }

    #[test]
    fn max_weight_prefers_lowest_index_on_tie() {
        let m = WeightMatrix::from_triplets(2, 3, vec![(0, 2, 0.4), (0, 0, 0.3), (0, 1, 0.4)]).unwrap();
        assert_eq!(get_max_weight_index(&m, 0), Some(1));
        assert_eq!(get_max_weight_index(&m, 1), None);
        assert_eq!(get_max_weight_index(&m, 9), None);
    }
}

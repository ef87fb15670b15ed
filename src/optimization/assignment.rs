use nalgebra as na;

use crate::error::{Error, Result};

/// Optimal one-to-one assignment minimizing the summed cost.
///
/// Works on rectangular matrices: `min(rows, cols)` pairs are returned as
/// `(row, col)`, sorted by row. Costs must be finite.
pub fn min_cost_assignment(cost: &na::DMatrix<f64>) -> Result<Vec<(usize, usize)>> {
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }
    if cost.iter().any(|c| !c.is_finite()) {
        return Err(Error::DegenerateInput(
            "assignment cost matrix contains non-finite values".to_string(),
        ));
    }
    if rows <= cols {
        return Ok(kuhn_munkres(cost));
    }
    let mut pairs: Vec<(usize, usize)> = kuhn_munkres(&cost.transpose())
        .into_iter()
        .map(|(c, r)| (r, c))
        .collect();
    pairs.sort_unstable();
    Ok(pairs)
}

/// Shortest augmenting path with row/column potentials, `rows <= cols`.
/// Indices inside are 1-based, slot 0 is the virtual source column.
fn kuhn_munkres(cost: &na::DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.shape();
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut row_of_col = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        row_of_col[0] = i;
        let mut j0 = 0;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = row_of_col[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[row_of_col[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }
            j0 = j1;
            if row_of_col[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            row_of_col[j0] = row_of_col[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&j| row_of_col[j] != 0)
        .map(|j| (row_of_col[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Pairwise Euclidean distances between two descriptor sets.
pub fn euclidean_cost_matrix(
    features0: &[&na::DVector<f64>],
    features1: &[&na::DVector<f64>],
) -> na::DMatrix<f64> {
    na::DMatrix::from_fn(features0.len(), features1.len(), |r, c| {
        (features0[r] - features1[c]).norm()
    })
}

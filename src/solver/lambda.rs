//! LAMBDA/MLAMBDA integer least squares.
//!
//! Exposed as a pure function for the carrier-phase filters: given a float
//! ambiguity vector and its covariance, return the `m` best integer
//! candidates and their quadratic forms, ordered ascending. The search
//! ratio `s[1]/s[0]` is the validation statistic consumed upstream.

use crate::Error;
use nalgebra::{DMatrix, DVector};

/// Depth-first search iteration bound
const LOOPMAX: usize = 10_000;

/// `Q = L^T diag(D) L` factorization, unit lower triangular `L`.
/// Fails on a non-positive pivot (covariance not positive definite).
fn factorize_ld(q: &DMatrix<f64>) -> Result<(DMatrix<f64>, DVector<f64>), Error> {
    let n = q.nrows();
    let mut a = q.clone();
    let mut l = DMatrix::zeros(n, n);
    let mut d = DVector::zeros(n);

    for i in (0..n).rev() {
        d[i] = a[(i, i)];
        if d[i] <= 0.0 {
            return Err(Error::LdFactorization(i));
        }
        let s = d[i].sqrt();
        for j in 0..=i {
            l[(i, j)] = a[(i, j)] / s;
        }
        for j in 0..i {
            for k in 0..=j {
                a[(j, k)] -= l[(i, k)] * l[(i, j)];
            }
        }
        for j in 0..=i {
            l[(i, j)] /= l[(i, i)];
        }
    }
    Ok((l, d))
}

/// Integer Gauss transform on column `j` against column `i`.
fn gauss(l: &mut DMatrix<f64>, z: &mut DMatrix<f64>, i: usize, j: usize) {
    let n = l.nrows();
    let mu = l[(i, j)].round();
    if mu != 0.0 {
        for k in i..n {
            l[(k, j)] -= mu * l[(k, i)];
        }
        for k in 0..n {
            z[(k, j)] -= mu * z[(k, i)];
        }
    }
}

/// Permutation of adjacent indices `j`, `j+1` with the new pivot `del`.
fn permute(l: &mut DMatrix<f64>, d: &mut DVector<f64>, j: usize, del: f64, z: &mut DMatrix<f64>) {
    let n = l.nrows();
    let eta = d[j] / del;
    let lam = d[j + 1] * l[(j + 1, j)] / del;

    d[j] = eta * d[j + 1];
    d[j + 1] = del;
    for k in 0..j {
        let a0 = l[(j, k)];
        let a1 = l[(j + 1, k)];
        l[(j, k)] = -l[(j + 1, j)] * a0 + a1;
        l[(j + 1, k)] = eta * a0 + lam * a1;
    }
    l[(j + 1, j)] = lam;
    for k in j + 2..n {
        l.swap((k, j), (k, j + 1));
    }
    for k in 0..n {
        z.swap((k, j), (k, j + 1));
    }
}

/// Lattice reduction: integer Gauss transforms plus size-reducing
/// permutations, accumulating the unimodular `Z`. Terminates when a full
/// sweep takes no permutation.
fn reduction(l: &mut DMatrix<f64>, d: &mut DVector<f64>, z: &mut DMatrix<f64>) {
    let n = l.nrows();
    let mut j = n as i64 - 2;
    let mut k = n as i64 - 2;

    while j >= 0 {
        let ju = j as usize;
        if j <= k {
            for i in ju + 1..n {
                gauss(l, z, i, ju);
            }
        }
        let del = d[ju] + l[(ju + 1, ju)] * l[(ju + 1, ju)] * d[ju + 1];
        if del + 1e-6 < d[ju + 1] {
            permute(l, d, ju, del, z);
            k = j;
            j = n as i64 - 2;
        } else {
            j -= 1;
        }
    }
}

/// MLAMBDA depth-first tree search for the `m` smallest quadratic forms.
fn search(
    l: &DMatrix<f64>,
    d: &DVector<f64>,
    zs: &DVector<f64>,
    m: usize,
) -> Result<(Vec<DVector<f64>>, Vec<f64>), Error> {
    let n = l.nrows();
    let mut candidates: Vec<DVector<f64>> = vec![DVector::zeros(n); m];
    let mut s = vec![0.0; m];
    let mut nn = 0usize;
    let mut imax = 0usize;
    let mut max_dist = 1e99;

    let mut partial = DMatrix::<f64>::zeros(n, n);
    let mut dist = vec![0.0; n];
    let mut zb = DVector::zeros(n);
    let mut z = DVector::zeros(n);
    let mut step = vec![0.0; n];

    let mut k = n - 1;
    zb[k] = zs[k];
    z[k] = zb[k].round();
    let mut y = zb[k] - z[k];
    step[k] = if y <= 0.0 { -1.0 } else { 1.0 };

    let mut c = 0;
    while c < LOOPMAX {
        let newdist = dist[k] + y * y / d[k];
        if newdist < max_dist {
            if k != 0 {
                k -= 1;
                dist[k] = newdist;
                for i in 0..=k {
                    partial[(k, i)] =
                        partial[(k + 1, i)] + (z[k + 1] - zb[k + 1]) * l[(k + 1, i)];
                }
                zb[k] = zs[k] + partial[(k, k)];
                z[k] = zb[k].round();
                y = zb[k] - z[k];
                step[k] = if y <= 0.0 { -1.0 } else { 1.0 };
            } else {
                if nn < m {
                    if nn == 0 || newdist > s[imax] {
                        imax = nn;
                    }
                    candidates[nn].copy_from(&z);
                    s[nn] = newdist;
                    nn += 1;
                } else {
                    if newdist < s[imax] {
                        candidates[imax].copy_from(&z);
                        s[imax] = newdist;
                        imax = 0;
                        for i in 0..m {
                            if s[imax] < s[i] {
                                imax = i;
                            }
                        }
                    }
                    max_dist = s[imax];
                }
                z[0] += step[0];
                y = zb[0] - z[0];
                step[0] = -step[0] - step[0].signum();
            }
        } else {
            if k == n - 1 {
                break;
            }
            k += 1;
            z[k] += step[k];
            y = zb[k] - z[k];
            step[k] = -step[k] - step[k].signum();
        }
        c += 1;
    }
    if c >= LOOPMAX {
        return Err(Error::SearchOverflow);
    }

    // order candidates by quadratic form ascending
    let mut order: Vec<usize> = (0..nn).collect();
    order.sort_by(|&a, &b| s[a].partial_cmp(&s[b]).unwrap());
    let sorted: Vec<DVector<f64>> = order.iter().map(|&i| candidates[i].clone()).collect();
    let forms: Vec<f64> = order.iter().map(|&i| s[i]).collect();
    Ok((sorted, forms))
}

/// Integer least squares: the `m` integer vectors nearest to `a` in the
/// metric of `Q`, with their quadratic forms ascending.
pub fn lambda(
    a: &DVector<f64>,
    q: &DMatrix<f64>,
    m: usize,
) -> Result<(Vec<DVector<f64>>, Vec<f64>), Error> {
    let n = a.len();
    assert!(n > 0 && q.nrows() == n && q.ncols() == n && m > 0);

    let (mut l, mut d) = factorize_ld(q)?;
    let mut z_mat = DMatrix::<f64>::identity(n, n);
    reduction(&mut l, &mut d, &mut z_mat);

    // z = Z^T a
    let zs = z_mat.transpose() * a;
    let (z_candidates, s) = search(&l, &d, &zs, m)?;

    // back transform: F = Z^-T E
    let zt = z_mat.transpose();
    let lu = zt.lu();
    let mut out = Vec::with_capacity(z_candidates.len());
    for cand in &z_candidates {
        let f = lu.solve(cand).ok_or(Error::MatrixSingular)?;
        // entries are integers up to round-off
        out.push(f.map(|v| v.round()));
    }
    Ok((out, s))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_covariance_rounds() {
        let a = DVector::from_vec(vec![0.35, 0.15, 0.87]);
        let q = DMatrix::identity(3, 3);
        let (f, s) = lambda(&a, &q, 2).unwrap();

        assert_eq!(f[0].as_slice(), &[0.0, 0.0, 1.0]);
        let expect = 0.35f64.powi(2) + 0.15f64.powi(2) + 0.13f64.powi(2);
        assert!((s[0] - expect).abs() < 1e-12, "s0 = {}", s[0]);
        assert!(s[1] / s[0] >= 2.0, "ratio = {}", s[1] / s[0]);
    }

    #[test]
    fn ld_reconstructs_q() {
        // a correlated SPD covariance
        let q = DMatrix::from_row_slice(
            3,
            3,
            &[6.29, 5.98, 0.54, 5.98, 6.29, 1.1, 0.54, 1.1, 6.29],
        );
        let (l, d) = factorize_ld(&q).unwrap();
        let rebuilt = l.transpose() * DMatrix::from_diagonal(&d) * l.clone();
        let err = (&rebuilt - &q).norm();
        assert!(err < 1e-10 * q.norm(), "err = {}", err);
    }

    #[test]
    fn ld_reconstructs_random_spd() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0FFEE);
        for n in [2usize, 4, 6, 8] {
            let a = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
            let q = &a * a.transpose() + DMatrix::identity(n, n) * n as f64;
            let (l, d) = factorize_ld(&q).unwrap();
            let rebuilt = l.transpose() * DMatrix::from_diagonal(&d) * l;
            assert!((&rebuilt - &q).norm() < 1e-10 * q.norm(), "n = {}", n);
        }
    }

    #[test]
    fn non_spd_is_rejected() {
        let q = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            factorize_ld(&q),
            Err(Error::LdFactorization(_))
        ));
    }

    #[test]
    fn reduction_preserves_candidates() {
        // the Z transform is unimodular, so searching the decorrelated
        // lattice must yield the same ordered quadratic forms as a direct
        // search on the original metric
        let a = DVector::from_vec(vec![5.45, 3.1, -2.39]);
        let q = DMatrix::from_row_slice(
            3,
            3,
            &[6.29, 5.98, 0.54, 5.98, 6.29, 1.1, 0.54, 1.1, 6.29],
        );
        let (_, s_reduced) = lambda(&a, &q, 4).unwrap();

        // same search on the unreduced factorization, Z = I
        let (l, d) = factorize_ld(&q).unwrap();
        let (_, s_direct) = search(&l, &d, &a, 4).unwrap();

        assert_eq!(s_reduced.len(), s_direct.len());
        for (x, y) in s_reduced.iter().zip(s_direct.iter()) {
            assert!((x - y).abs() < 1e-9, "{} vs {}", x, y);
        }
        for w in s_reduced.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn correlated_case_known_solution() {
        // canonical MLAMBDA example (Chang, Yang & Zhou 2005)
        let a = DVector::from_vec(vec![5.45, 3.1, -2.39]);
        let q = DMatrix::from_row_slice(
            3,
            3,
            &[6.29, 5.98, 0.54, 5.98, 6.29, 1.1, 0.54, 1.1, 6.29],
        );
        let (f, s) = lambda(&a, &q, 2).unwrap();
        assert_eq!(f[0].as_slice(), &[5.0, 3.0, -2.0]);
        assert!(s[0] < s[1]);
    }
}

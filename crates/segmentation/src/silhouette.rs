use ndarray::{Array2, ArrayView1};
use std::collections::BTreeMap;

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Mean silhouette coefficient over labeled points. Noise is ignored.
/// Returns 0.0 when there are fewer than two clusters or every point is
/// its own cluster.
pub fn silhouette_score(points: &Array2<f64>, labels: &[Option<usize>]) -> f64 {
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        if let Some(l) = label {
            clusters.entry(*l).or_default().push(i);
        }
    }
    let n: usize = clusters.values().map(Vec::len).sum();
    if clusters.len() < 2 || clusters.len() >= n {
        return 0.0;
    }

    let mean_distance = |i: usize, members: &[usize]| -> f64 {
        let total: f64 = members
            .iter()
            .filter(|j| **j != i)
            .map(|j| distance(points.row(i), points.row(*j)))
            .sum();
        let count = members.iter().filter(|j| **j != i).count();
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    };

    let mut sum = 0.0;
    for (label, members) in &clusters {
        for &i in members {
            if members.len() == 1 {
                continue;
            }
            let a = mean_distance(i, members);
            let b = clusters
                .iter()
                .filter(|(other, _)| *other != label)
                .map(|(_, others)| mean_distance(i, others))
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                sum += (b - a) / denom;
            }
        }
    }
    sum / n as f64
}

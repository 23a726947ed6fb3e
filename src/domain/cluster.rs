//! Single-linkage agglomerative clustering.
//!
//! Clusters are merged by the smallest pairwise member distance. Ties are
//! broken by the lowest leaf index in each cluster, and the child holding the
//! lower leaf index always goes left, so the tree only depends on the input
//! order through those indices.

use crate::domain::linalg::Matrix;

#[derive(Debug, Clone, PartialEq)]
pub enum Dendrogram {
    Leaf(usize),
    Merge {
        left: Box<Dendrogram>,
        right: Box<Dendrogram>,
        distance: f64,
        size: usize,
    },
}

impl Dendrogram {
    pub fn size(&self) -> usize {
        match self {
            Dendrogram::Leaf(_) => 1,
            Dendrogram::Merge { size, .. } => *size,
        }
    }

    fn min_leaf(&self) -> usize {
        match self {
            Dendrogram::Leaf(i) => *i,
            Dendrogram::Merge { left, .. } => left.min_leaf(),
        }
    }

    /// Leaves in left-to-right order (the quasi-diagonal ordering).
    pub fn leaf_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.size());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Dendrogram::Leaf(i) => out.push(*i),
                Dendrogram::Merge { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }

    /// Merge heights of every internal node, ascending.
    pub fn merge_distances(&self) -> Vec<f64> {
        let mut heights = Vec::new();
        collect_heights(self, &mut heights);
        heights.sort_by(f64::total_cmp);
        heights
    }
}

fn collect_heights(node: &Dendrogram, out: &mut Vec<f64>) {
    if let Dendrogram::Merge {
        left,
        right,
        distance,
        ..
    } = node
    {
        collect_heights(left, out);
        collect_heights(right, out);
        out.push(*distance);
    }
}

/// Build the single-linkage tree over a symmetric distance matrix.
/// Returns `None` for an empty matrix.
pub fn single_linkage(distance: &Matrix) -> Option<Dendrogram> {
    let n = distance.len();
    if n == 0 {
        return None;
    }

    let mut clusters: Vec<(Dendrogram, Vec<usize>)> =
        (0..n).map(|i| (Dendrogram::Leaf(i), vec![i])).collect();

    while clusters.len() > 1 {
        let mut best: Option<(f64, usize, usize)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let d = linkage_distance(distance, &clusters[a].1, &clusters[b].1);
                let better = match best {
                    None => true,
                    Some((bd, ba, bb)) => {
                        d < bd || (d == bd && cluster_key(&clusters, a, b) < cluster_key(&clusters, ba, bb))
                    }
                };
                if better {
                    best = Some((d, a, b));
                }
            }
        }

        let Some((d, a, b)) = best else { break };
        // b > a, remove the later index first.
        let (node_b, members_b) = clusters.remove(b);
        let (node_a, members_a) = clusters.remove(a);
        let (left, right) = if node_a.min_leaf() <= node_b.min_leaf() {
            (node_a, node_b)
        } else {
            (node_b, node_a)
        };
        let size = left.size() + right.size();
        let mut members = members_a;
        members.extend(members_b);
        members.sort_unstable();
        clusters.push((
            Dendrogram::Merge {
                left: Box::new(left),
                right: Box::new(right),
                distance: d,
                size,
            },
            members,
        ));
    }

    clusters.pop().map(|(node, _)| node)
}

fn linkage_distance(distance: &Matrix, a: &[usize], b: &[usize]) -> f64 {
    a.iter()
        .flat_map(|&i| b.iter().map(move |&j| distance[i][j]))
        .fold(f64::INFINITY, f64::min)
}

fn cluster_key(clusters: &[(Dendrogram, Vec<usize>)], a: usize, b: usize) -> (usize, usize) {
    let x = clusters[a].1[0];
    let y = clusters[b].1[0];
    (x.min(y), x.max(y))
}

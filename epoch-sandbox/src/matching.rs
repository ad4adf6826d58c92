use bitarray::BitArray;

/// For each descriptor in `from`, the index of its nearest neighbour in `to`.
///
/// A neighbour is only accepted if it is distinctive: its Hamming distance must be at most
/// `1 - threshold` times the distance to the second nearest neighbour. A threshold of `0`
/// accepts every nearest neighbour and larger thresholds demand a larger margin.
pub fn nearest(from: &[BitArray<64>], to: &[BitArray<64>], threshold: f32) -> Vec<Option<usize>> {
    from.iter()
        .map(|a| {
            let mut best: Option<(usize, usize)> = None;
            let mut second = usize::MAX;
            for (ix, b) in to.iter().enumerate() {
                let distance = a.distance(b);
                match best {
                    Some((best_distance, _)) if distance >= best_distance => {
                        second = second.min(distance);
                    }
                    _ => {
                        if let Some((previous, _)) = best {
                            second = previous;
                        }
                        best = Some((distance, ix));
                    }
                }
            }
            best.filter(|&(distance, _)| {
                distance as f32 <= (1.0 - threshold) * second as f32
            })
            .map(|(_, ix)| ix)
        })
        .collect()
}

/// The pairs `[i, j]` where `b[j]` is the accepted nearest neighbour of `a[i]` and vice versa.
///
/// Pairs are ordered by `i`, and no index appears twice on either side.
pub fn symmetric_matching(
    a: &[BitArray<64>],
    b: &[BitArray<64>],
    threshold: f32,
) -> Vec<[usize; 2]> {
    let forward = nearest(a, b, threshold);
    let reverse = nearest(b, a, threshold);
    forward
        .into_iter()
        .enumerate()
        .filter_map(|(ix, j)| j.map(|j| [ix, j]))
        .filter(|&[ix, j]| reverse[j] == Some(ix))
        .collect()
}

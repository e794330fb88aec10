use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::vectors::{dot, normalize, Vectors};

/// For each word in `ids`, the `num` most similar words by cosine similarity,
/// most similar first. The word itself is included (normally first).
pub fn nearby(vectors: &Vectors, ids: &[usize], num: usize) -> Vec<Vec<(usize, f32)>> {
    ids.par_iter()
        .map(|&id| closest(vectors, &vectors[id], &[], num))
        .collect()
}

/// The `num` words whose vectors are closest in direction to `vec`,
/// excluding `skip`, most similar first.
pub fn closest(vectors: &Vectors, vec: &[f32], skip: &[usize], num: usize) -> Vec<(usize, f32)> {
    let mut best: Vec<(usize, f32)> = (0..vectors.num_words())
        .filter(|c| !skip.contains(c))
        .map(|c| (c, dot(vec, &vectors[c])))
        .collect();
    best.sort_by_key(|&(_, dist)| Reverse(OrderedFloat(dist)));
    best.truncate(num);
    best
}

/// Normalized sum of the vectors for `ids`.
pub fn centroid(vectors: &Vectors, ids: &[usize]) -> Vec<f32> {
    let mut vec = vec![0.0f32; vectors.size()];
    for &i in ids {
        for (v, &r) in vec.iter_mut().zip(&vectors[i]) {
            *v += r;
        }
    }
    normalize(&mut vec);
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compass() -> Vectors {
        let words = ["UNK", "north", "northeast", "east", "south"];
        #[rustfmt::skip]
        let emb = vec![
            0.0, 0.0,
            0.0, 1.0,
            1.0, 1.0,
            1.0, 0.0,
            0.0, -1.0,
        ];
        Vectors::from_embeddings(words.map(String::from).to_vec(), 2, emb)
    }

    #[test]
    fn query_word_comes_first() {
        let v = compass();
        let result = nearby(&v, &[1, 3], 3);
        assert_eq!(result.len(), 2);
        let ids: Vec<usize> = result[0].iter().map(|&(id, _)| id).collect();
        assert_eq!(ids, [1, 2, 0]);
        assert!((result[0][0].1 - 1.0).abs() < 1e-6);
        assert_eq!(result[1][0].0, 3);
        assert_eq!(result[1][1].0, 2);
    }

    #[test]
    fn similarities_descend() {
        let v = compass();
        for row in nearby(&v, &[1, 2, 3, 4], 10) {
            assert_eq!(row.len(), 5);
            assert!(row.windows(2).all(|w| w[0].1 >= w[1].1));
        }
    }

    #[test]
    fn centroid_of_two_words() {
        let v = compass();
        let c = centroid(&v, &[1, 3]);
        let best = closest(&v, &c, &[1, 3], 1);
        assert_eq!(best[0].0, 2);
    }
}

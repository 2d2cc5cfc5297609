// Lane-packed Phase-1 sweeps: up to W queries per call, one per lane.
//
// The graph is shared across lanes, so adjacency walks are scalar while
// every score update is a W-wide loop over the packed row buffers
// (structure-of-arrays, cell j occupying row[j*W .. j*W+W]). Queries
// shorter than the longest in the batch are padded with LANE_PAD, and the
// per-lane best tracking is masked to real rows, so padding can never
// contribute a score or an end coordinate.

use crate::align::phase1::{EndAnchor, StartAnchor};
use crate::align::simd::{LaneWidth, LaneWord, LANE_PAD};
use crate::graph::csr_char::CharDag;
use crate::params::ScoreParams;

/// Forward sweep over a batch of at most `width.lanes()` queries.
pub fn forward_batch(
    width: LaneWidth,
    queries: &[&[u8]],
    graph: &CharDag,
    params: &ScoreParams,
) -> Vec<EndAnchor> {
    match width {
        LaneWidth::W8 => forward_lanes::<i8>(queries, graph, params),
        LaneWidth::W16 => forward_lanes::<i16>(queries, graph, params),
        LaneWidth::W32 => forward_lanes::<i32>(queries, graph, params),
    }
}

/// Reverse sweep over a batch; one end anchor per query, in lane order.
pub fn reverse_batch(
    width: LaneWidth,
    rqueries: &[&[u8]],
    anchors: &[EndAnchor],
    graph: &CharDag,
    params: &ScoreParams,
) -> Vec<StartAnchor> {
    match width {
        LaneWidth::W8 => reverse_lanes::<i8>(rqueries, anchors, graph, params),
        LaneWidth::W16 => reverse_lanes::<i16>(rqueries, anchors, graph, params),
        LaneWidth::W32 => reverse_lanes::<i32>(rqueries, anchors, graph, params),
    }
}

/// Per-batch scratch shared by both sweeps.
struct LaneState<T> {
    row_even: Vec<T>,
    row_odd: Vec<T>,
    qrow: Vec<u8>,
    sub: Vec<T>,
    cur_max: Vec<T>,
}

impl<T: LaneWord> LaneState<T> {
    fn new(n: usize) -> Self {
        let w = T::LANES;
        Self {
            row_even: vec![T::default(); n * w],
            row_odd: vec![T::default(); n * w],
            qrow: vec![LANE_PAD; w],
            sub: vec![T::default(); w],
            cur_max: vec![T::default(); w],
        }
    }

    /// Query bytes for row i, padded past each lane's end.
    fn fill_query_row(&mut self, queries: &[&[u8]], i: usize) {
        for (w, slot) in self.qrow.iter_mut().enumerate() {
            *slot = match queries.get(w) {
                Some(q) if i < q.len() => q[i],
                _ => LANE_PAD,
            };
        }
    }
}

fn forward_lanes<T: LaneWord>(
    queries: &[&[u8]],
    graph: &CharDag,
    params: &ScoreParams,
) -> Vec<EndAnchor> {
    let w = T::LANES;
    let lanes = queries.len();
    assert!(lanes <= w, "batch exceeds lane count");
    let n = graph.vertex_count();
    let rows = queries.iter().map(|q| q.len()).max().unwrap_or(0);

    let zero = T::from_i32(0);
    let match_w = T::from_i32(params.match_score);
    let mismatch_w = T::from_i32(-params.mismatch);
    let ins_w = T::from_i32(params.ins);
    let del_w = T::from_i32(params.del);

    let mut st = LaneState::<T>::new(n);
    let mut best = vec![zero; w];
    let mut best_row = vec![0i32; w];
    let mut best_col = vec![0i32; w];

    for i in 0..rows {
        st.fill_query_row(queries, i);
        let (cur, prev) = if i & 1 == 0 {
            (&mut st.row_even, &st.row_odd)
        } else {
            (&mut st.row_odd, &st.row_even)
        };

        for j in 0..n {
            let label = graph.label(j);
            for k in 0..w {
                st.sub[k] = if st.qrow[k] == label { match_w } else { mismatch_w };
                st.cur_max[k] = zero.lane_max(st.sub[k]);
            }

            for &u in graph.in_neighbors(j) {
                let base = u as usize * w;
                for k in 0..w {
                    st.cur_max[k] = st.cur_max[k].lane_max(prev[base + k].sat_add(st.sub[k]));
                    st.cur_max[k] = st.cur_max[k].lane_max(cur[base + k].sat_sub(del_w));
                }
            }

            let base = j * w;
            for k in 0..w {
                st.cur_max[k] = st.cur_max[k].lane_max(prev[base + k].sat_sub(ins_w));
                cur[base + k] = st.cur_max[k];
            }

            // Last-scanned cell wins ties; padded rows never take part
            for (k, q) in queries.iter().enumerate() {
                if i < q.len() && st.cur_max[k].to_i32() >= best[k].to_i32() {
                    best[k] = st.cur_max[k];
                    best_row[k] = i as i32;
                    best_col[k] = j as i32;
                }
            }
        }
    }

    (0..lanes)
        .map(|k| EndAnchor {
            score: best[k].to_i32(),
            end_row: best_row[k],
            end_col: best_col[k],
        })
        .collect()
}

fn reverse_lanes<T: LaneWord>(
    rqueries: &[&[u8]],
    anchors: &[EndAnchor],
    graph: &CharDag,
    params: &ScoreParams,
) -> Vec<StartAnchor> {
    let w = T::LANES;
    let lanes = rqueries.len();
    assert!(lanes <= w, "batch exceeds lane count");
    assert_eq!(lanes, anchors.len());
    let n = graph.vertex_count();
    let rows = rqueries.iter().map(|q| q.len()).max().unwrap_or(0);

    let zero = T::from_i32(0);
    let one = T::from_i32(1);
    let match_w = T::from_i32(params.match_score);
    let mismatch_w = T::from_i32(-params.mismatch);
    let ins_w = T::from_i32(params.ins);
    let del_w = T::from_i32(params.del);

    let mut st = LaneState::<T>::new(n);
    let mut best = vec![zero; w];
    let mut best_row = vec![0i32; w];
    let mut best_col = vec![0i32; w];

    for i in 0..rows {
        st.fill_query_row(rqueries, i);
        let (cur, prev) = if i & 1 == 0 {
            (&mut st.row_even, &st.row_odd)
        } else {
            (&mut st.row_odd, &st.row_even)
        };

        for j in (0..n).rev() {
            let label = graph.label(j);
            for k in 0..w {
                st.sub[k] = if st.qrow[k] == label { match_w } else { mismatch_w };
                st.cur_max[k] = zero.lane_max(st.sub[k]);
            }

            for &v in graph.out_neighbors(j) {
                let base = v as usize * w;
                for k in 0..w {
                    st.cur_max[k] = st.cur_max[k].lane_max(prev[base + k].sat_add(st.sub[k]));
                    st.cur_max[k] = st.cur_max[k].lane_max(cur[base + k].sat_sub(del_w));
                }
            }

            let base = j * w;
            for k in 0..w {
                st.cur_max[k] = st.cur_max[k].lane_max(prev[base + k].sat_sub(ins_w));
            }

            // The +1 tag at the mirror of each lane's known end cell, applied
            // before the store and before best tracking
            for (k, q) in rqueries.iter().enumerate() {
                if i < q.len() {
                    let orig_row = (q.len() - 1 - i) as i32;
                    if j as i32 == anchors[k].end_col && orig_row == anchors[k].end_row {
                        debug_assert_eq!(st.cur_max[k].to_i32(), params.match_score);
                        st.cur_max[k] = st.cur_max[k].sat_add(one);
                    }
                }
            }

            for k in 0..w {
                cur[base + k] = st.cur_max[k];
            }

            for (k, q) in rqueries.iter().enumerate() {
                if i < q.len() && st.cur_max[k].to_i32() >= best[k].to_i32() {
                    best[k] = st.cur_max[k];
                    best_row[k] = (q.len() - 1 - i) as i32;
                    best_col[k] = j as i32;
                }
            }
        }
    }

    (0..lanes)
        .map(|k| StartAnchor {
            best_rev: best[k].to_i32(),
            start_row: best_row[k],
            start_col: best_col[k],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::phase1;
    use crate::align::simd::choose_lane_width;
    use crate::graph::csr::ChunkGraph;

    fn chain_dag(labels: &[&str]) -> CharDag {
        let edges = (0..labels.len() as u32 - 1).map(|i| (i, i + 1)).collect();
        let mut g = ChunkGraph::new(labels.iter().map(|s| s.to_string()).collect(), edges).unwrap();
        g.sort().unwrap();
        g.to_char_dag().unwrap()
    }

    fn unit() -> ScoreParams {
        ScoreParams::new(1, 1, 1, 1).unwrap()
    }

    #[test]
    fn mixed_length_batch_matches_scalar() {
        let dag = chain_dag(&["AC", "GT", "GCCTG", "CT"]);
        let p = unit();
        let queries: Vec<&[u8]> = vec![
            b"ACGTGCCTGCT",
            b"ACT",
            b"TTACGTGCCTGCTAA",
            b"GCCTG",
            b"NNNN",
        ];
        for width in [LaneWidth::W8, LaneWidth::W16, LaneWidth::W32] {
            let got = forward_batch(width, &queries, &dag, &p);
            for (q, anchor) in queries.iter().zip(&got) {
                assert_eq!(*anchor, phase1::forward_scalar(q, &dag, &p));
            }
        }
    }

    #[test]
    fn reverse_batch_matches_scalar() {
        let dag = chain_dag(&["AC", "GT", "GCCTG", "CT"]);
        let p = unit();
        let queries: Vec<&[u8]> = vec![b"ACGTGCCTGCT", b"TTACGTGCCTGCTAA", b"GTGC"];
        let anchors: Vec<_> = queries
            .iter()
            .map(|q| phase1::forward_scalar(q, &dag, &p))
            .collect();
        let rqueries: Vec<Vec<u8>> = queries
            .iter()
            .map(|q| q.iter().rev().copied().collect())
            .collect();
        let rq_refs: Vec<&[u8]> = rqueries.iter().map(|q| q.as_slice()).collect();

        let width = choose_lane_width(15, p.match_score, 1);
        let got = reverse_batch(width, &rq_refs, &anchors, &dag, &p);
        for ((rq, &anchor), start) in rq_refs.iter().zip(&anchors).zip(&got) {
            let want = phase1::reverse_scalar(rq, &dag, &p, anchor);
            assert_eq!(*start, want);
            assert_eq!(start.best_rev, anchor.score + 1);
        }
    }

    #[test]
    fn padding_cannot_win_ties() {
        // With an all-zero cost model every cell ties at 0; the masked best
        // tracking must still confine end coordinates to real rows.
        let dag = chain_dag(&["ACGT"]);
        let p = ScoreParams::new(0, 0, 0, 0).unwrap();
        let queries: Vec<&[u8]> = vec![b"AC", b"ACGTACGT"];
        let got = forward_batch(LaneWidth::W8, &queries, &dag, &p);
        assert!(got[0].end_row < 2);
        assert_eq!(got[0], phase1::forward_scalar(b"AC", &dag, &p));
    }
}

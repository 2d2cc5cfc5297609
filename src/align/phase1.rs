// Phase 1: full-width DP sweeps that locate the best local alignment.
//
// The forward sweep finds the score and end cell of each query's best
// local alignment; the reverse sweep runs the same recurrence on the
// reversed query against the transposed graph and recovers the start cell.
// Both keep only two DP rows alive (ring on the row parity), so memory
// stays at two rows of |V| cells regardless of query length.
//
// Columns are visited in topological order (forward: ascending, reverse:
// descending). Every in-neighbor of a column precedes it in that order,
// which lets same-row deletion chains resolve in a single left-to-right
// pass with no fixed-point iteration.

use crate::graph::csr_char::CharDag;
use crate::params::ScoreParams;

/// Score and end cell from the forward sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndAnchor {
    pub score: i32,
    pub end_row: i32,
    pub end_col: i32,
}

/// Start cell from the reverse sweep, plus the tagged best score
/// (forward score + 1 when everything is consistent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartAnchor {
    pub best_rev: i32,
    pub start_row: i32,
    pub start_col: i32,
}

/// Forward DP for one query. Among equal-scoring cells the most recently
/// scanned one wins (largest (row, col) in row-major order); this fixes
/// the reported end coordinates and is relied on downstream.
pub fn forward_scalar(query: &[u8], graph: &CharDag, params: &ScoreParams) -> EndAnchor {
    let n = graph.vertex_count();
    let mut row_even = vec![0i32; n];
    let mut row_odd = vec![0i32; n];

    let mut best = 0i32;
    let mut best_row = 0i32;
    let mut best_col = 0i32;

    for (i, &q) in query.iter().enumerate() {
        let (cur, prev) = if i & 1 == 0 {
            (&mut row_even, &row_odd)
        } else {
            (&mut row_odd, &row_even)
        };

        for j in 0..n {
            let sub = params.substitution(q, graph.label(j));

            // A local alignment may start fresh with this character
            let mut cur_max = sub.max(0);

            for &u in graph.in_neighbors(j) {
                let u = u as usize;
                cur_max = cur_max.max(prev[u] + sub);
                cur_max = cur_max.max(cur[u] - params.del);
            }
            cur_max = cur_max.max(prev[j] - params.ins);
            cur[j] = cur_max;

            if cur_max >= best {
                best = cur_max;
                best_row = i as i32;
                best_col = j as i32;
            }
        }
    }

    EndAnchor {
        score: best,
        end_row: best_row,
        end_col: best_col,
    }
}

/// Reverse DP for one query: the query arrives reversed and the sweep runs
/// right-to-left over the out-adjacency, i.e. against the transposed graph.
/// When the mirror of the known end cell is computed, its value (which must
/// be exactly `match`: a local alignment ends with a match) is incremented
/// by one before it is stored and tracked. That +1 propagates along the
/// optimal path only, so the global argmax lands on the mirror of the true
/// alignment start with a margin of exactly one over every alternative.
pub fn reverse_scalar(
    rquery: &[u8],
    graph: &CharDag,
    params: &ScoreParams,
    anchor: EndAnchor,
) -> StartAnchor {
    let n = graph.vertex_count();
    let m = rquery.len();
    let mut row_even = vec![0i32; n];
    let mut row_odd = vec![0i32; n];

    let mut best = 0i32;
    let mut best_row = 0i32;
    let mut best_col = 0i32;

    for (i, &q) in rquery.iter().enumerate() {
        let (cur, prev) = if i & 1 == 0 {
            (&mut row_even, &row_odd)
        } else {
            (&mut row_odd, &row_even)
        };
        let orig_row = (m - 1 - i) as i32;

        for j in (0..n).rev() {
            let sub = params.substitution(q, graph.label(j));

            let mut cur_max = sub.max(0);
            for &v in graph.out_neighbors(j) {
                let v = v as usize;
                cur_max = cur_max.max(prev[v] + sub);
                cur_max = cur_max.max(cur[v] - params.del);
            }
            cur_max = cur_max.max(prev[j] - params.ins);

            if j as i32 == anchor.end_col && orig_row == anchor.end_row {
                debug_assert_eq!(cur_max, params.match_score);
                cur_max += 1;
            }
            cur[j] = cur_max;

            if cur_max >= best {
                best = cur_max;
                best_row = orig_row;
                best_col = j as i32;
            }
        }
    }

    StartAnchor {
        best_rev: best,
        start_row: best_row,
        start_col: best_col,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::csr::ChunkGraph;

    fn chain(labels: &[&str], params: ScoreParams) -> (CharDag, ScoreParams) {
        let edges = (0..labels.len() as u32 - 1).map(|i| (i, i + 1)).collect();
        let mut g = ChunkGraph::new(labels.iter().map(|s| s.to_string()).collect(), edges).unwrap();
        g.sort().unwrap();
        (g.to_char_dag().unwrap(), params)
    }

    fn unit() -> ScoreParams {
        ScoreParams::new(1, 1, 1, 1).unwrap()
    }

    #[test]
    fn exact_path_scores_its_length() {
        let (dag, p) = chain(&["AC", "GT", "GCCTG", "CT"], unit());
        let hit = forward_scalar(b"ACGTGCCTGCT", &dag, &p);
        assert_eq!(hit.score, 11);
        assert_eq!(hit.end_row, 10);
        assert_eq!(hit.end_col, 10);
    }

    #[test]
    fn single_vertex_single_match() {
        let (dag, p) = chain(&["A"], unit());
        let hit = forward_scalar(b"A", &dag, &p);
        assert_eq!(hit.score, 1);
        assert_eq!(hit.end_row, 0);
        assert_eq!(hit.end_col, 0);
    }

    #[test]
    fn tie_break_takes_last_in_scan_order() {
        // Two disjoint AC hits; the later columns must win the tie.
        let (dag, p) = chain(&["A", "C", "A", "C"], unit());
        let hit = forward_scalar(b"AC", &dag, &p);
        assert_eq!(hit.score, 2);
        assert_eq!(hit.end_row, 1);
        assert_eq!(hit.end_col, 3);
    }

    #[test]
    fn reverse_sweep_finds_start_with_unit_margin() {
        let (dag, p) = chain(&["AC", "GT", "GCCTG", "CT"], unit());
        let query = b"TTACGTGCCTGCTAA";
        let hit = forward_scalar(query, &dag, &p);
        assert_eq!(hit.score, 11);
        assert_eq!(hit.end_row, 12);
        assert_eq!(hit.end_col, 10);

        let mut rquery = query.to_vec();
        rquery.reverse();
        let start = reverse_scalar(&rquery, &dag, &p, hit);
        assert_eq!(start.best_rev, hit.score + 1);
        assert_eq!(start.start_row, 2);
        assert_eq!(start.start_col, 0);
    }

    #[test]
    fn single_cell_alignment_keeps_the_margin() {
        let (dag, p) = chain(&["A"], unit());
        let hit = forward_scalar(b"A", &dag, &p);
        let start = reverse_scalar(b"A", &dag, &p, hit);
        assert_eq!(start.best_rev, hit.score + 1);
        assert_eq!(start.start_row, 0);
        assert_eq!(start.start_col, 0);
    }

    #[test]
    fn score_never_negative() {
        let (dag, p) = chain(&["ACGT"], unit());
        let hit = forward_scalar(b"TTTT", &dag, &p);
        assert!(hit.score >= 0);
    }
}

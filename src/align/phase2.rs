// Phase 2: banded recompute and traceback.
//
// Phases 1/1R pinned the best alignment to the rectangle
// [qry_row_start..qry_row_end] x [ref_col_start..ref_col_end]. The DP is
// recomputed inside that rectangle only, with in-edges from columns left of
// the band treated as absent. Instead of the full score matrix, only the
// per-cell vertical difference H(i,j) - H(i-1,j) is kept (one i8 per cell);
// during backtrace each predecessor row is reconstructed from the current
// row and those differences.

use crate::align::best::BestScoreInfo;
use crate::error::{AlignError, Result};
use crate::graph::csr_char::CharDag;
use crate::params::ScoreParams;
use crate::seq::{cigar_score, compact_cigar};

fn invariant(info: &BestScoreInfo, details: String) -> AlignError {
    AlignError::Invariant {
        query: info.query_id,
        details,
    }
}

/// Recompute the DP inside the rectangle and backtrace into a CIGAR and
/// the list of visited reference columns. `query` is the winning
/// orientation of the read. Fills `info.cigar` and `info.ref_columns`.
pub fn traceback(query: &[u8], graph: &CharDag, params: &ScoreParams, info: &mut BestScoreInfo) -> Result<()> {
    let n = graph.vertex_count() as i32;
    let m = query.len() as i32;
    if info.ref_col_start < 0
        || info.ref_col_end < info.ref_col_start
        || info.ref_col_end >= n
        || info.qry_row_start < 0
        || info.qry_row_end < info.qry_row_start
        || info.qry_row_end >= m
    {
        return Err(invariant(
            info,
            format!(
                "alignment rectangle rows {}..={} cols {}..={} does not fit the {} x {} grid",
                info.qry_row_start, info.qry_row_end, info.ref_col_start, info.ref_col_end, m, n
            ),
        ));
    }

    let j0 = info.ref_col_start as usize;
    let i0 = info.qry_row_start as usize;
    let width = (info.ref_col_end - info.ref_col_start + 1) as usize;
    let height = (info.qry_row_end - info.qry_row_start + 1) as usize;

    // Vertical score differences for every cell of the rectangle
    let mut delta = vec![0i8; width * height];
    let mut final_row = vec![0i32; width];

    {
        let mut row_even = vec![0i32; width];
        let mut row_odd = vec![0i32; width];

        for i in 0..height {
            let (cur, prev) = if i & 1 == 0 {
                (&mut row_even, &row_odd)
            } else {
                (&mut row_odd, &row_even)
            };

            for j in 0..width {
                let sub = params.substitution(query[i + i0], graph.label(j + j0));

                let from_ins = prev[j] - params.ins;
                // Also covers a fresh start when the in-degree inside the band is zero
                let mut from_match = sub;
                let mut from_del = -1;
                for &u in graph.in_neighbors(j + j0) {
                    let u = u as usize;
                    if u >= j0 {
                        from_match = from_match.max(prev[u - j0] + sub);
                        from_del = from_del.max(cur[u - j0] - params.del);
                    }
                }

                let score = from_ins.max(from_match).max(from_del).max(0);
                cur[j] = score;
                let diff = score - prev[j];
                debug_assert!(i8::try_from(diff).is_ok());
                delta[i * width + j] = diff as i8;
            }

            if i == height - 1 {
                final_row.copy_from_slice(cur);
            }
        }
    }

    let recomputed = final_row.iter().copied().max().unwrap_or(0);
    if recomputed != info.score || final_row[width - 1] != info.score {
        return Err(invariant(
            info,
            format!(
                "banded recompute found {} at the end cell but phase 1 reported {}",
                final_row[width - 1], info.score
            ),
        ));
    }

    // Backtrace from the end cell, reconstructing each row above from the
    // vertical differences. Priority: match/mismatch, deletion, insertion.
    let mut cur_row = final_row;
    let mut above = vec![0i32; width];
    let mut col = width as i32 - 1;
    let mut row = height as i32 - 1;
    let mut ops: Vec<u8> = Vec::new();
    let mut used_cols: Vec<i32> = Vec::new();

    while col >= 0 && row >= 0 {
        used_cols.push(col + j0 as i32);
        let c = col as usize;
        if cur_row[c] <= 0 {
            break;
        }

        for j in 0..width {
            above[j] = cur_row[j] - delta[row as usize * width + j] as i32;
        }

        let sub = params.substitution(query[row as usize + i0], graph.label(c + j0));
        let from_ins = above[c] - params.ins;

        let mut from_match = sub;
        let mut from_match_pos = c;
        let mut from_del = -1;
        let mut from_del_pos: Option<usize> = None;

        for &u in graph.in_neighbors(c + j0) {
            let u = u as usize;
            if u >= j0 {
                let from_col = u - j0;
                if from_match < above[from_col] + sub {
                    from_match = above[from_col] + sub;
                    from_match_pos = from_col;
                }
                if from_del < cur_row[from_col] - params.del {
                    from_del = cur_row[from_col] - params.del;
                    from_del_pos = Some(from_col);
                }
            }
        }

        if cur_row[c] == from_match {
            ops.push(if sub == params.match_score { b'=' } else { b'X' });
            // A match arriving from the cell itself is where the alignment began
            if from_match_pos == c {
                break;
            }
            col = from_match_pos as i32;
            row -= 1;
            std::mem::swap(&mut cur_row, &mut above);
        } else if from_del_pos.is_some() && cur_row[c] == from_del {
            ops.push(b'D');
            col = from_del_pos.expect("deletion predecessor") as i32;
        } else if cur_row[c] == from_ins {
            ops.push(b'I');
            row -= 1;
            std::mem::swap(&mut cur_row, &mut above);
        } else {
            return Err(invariant(
                info,
                format!(
                    "no predecessor reproduces cell value {} at row {} col {}",
                    cur_row[c], row, col
                ),
            ));
        }
    }

    ops.reverse();
    info.cigar = compact_cigar(&ops);
    used_cols.reverse();
    info.ref_columns = used_cols;

    let rescored = cigar_score(&info.cigar, params);
    if rescored != info.score {
        return Err(invariant(
            info,
            format!("CIGAR {} rescores to {} but the stored best is {}", info.cigar, rescored, info.score),
        ));
    }
    Ok(())
}

// Alignment dispatcher: owns the worker pool, sequences the three phases
// and parcels reads out to workers.
//
// Phase 1 runs both orientations of every read (forward and reverse
// complement) through the forward sweep; the strand selector keeps the
// better one. Phase 1-reverse recovers start coordinates for the winners,
// phase 2 produces CIGARs. Work items are independent: phases 1/1R take a
// batch of W lane-packed reads per item, phase 2 one read per item. The
// graph is shared read-only; every result lands in its own slot indexed by
// read number, so output order equals input order.

pub mod best;
pub mod phase1;
pub mod phase2;
pub mod simd;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

pub use best::{BestScoreInfo, Strand};
use phase1::{EndAnchor, StartAnchor};

use crate::error::{AlignError, Result};
use crate::graph::csr_char::CharDag;
use crate::io::query_reader::ReadBatch;
use crate::params::ScoreParams;
use crate::seq::reverse_complement;

/// Which Phase-1 implementation to run. The lane-packed engine is the
/// default; the scalar one is the reference the lane engine must agree
/// with bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Lanes,
    Scalar,
}

/// Cooperative cancellation flag, checked between work items. Cancelled
/// reads produce no record.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wall-clock time spent in each phase, collected by the dispatcher and
/// handed back with the records.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub phase1: Duration,
    pub phase1_rev: Duration,
    pub phase2: Duration,
}

pub struct Aligner<'g> {
    graph: &'g CharDag,
    params: ScoreParams,
    pool: rayon::ThreadPool,
    engine: EngineKind,
    cancel: CancelToken,
}

/// A read that survived strand selection with a positive score.
struct Pending {
    read_id: usize,
    strand: Strand,
    anchor: EndAnchor,
}

impl<'g> Aligner<'g> {
    pub fn new(
        graph: &'g CharDag,
        params: ScoreParams,
        threads: usize,
        engine: EngineKind,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| AlignError::InvalidArgument(format!("cannot build thread pool: {}", e)))?;
        Ok(Self {
            graph,
            params,
            pool,
            engine,
            cancel: CancelToken::new(),
        })
    }

    /// Handle callers can use to cancel the job from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Align every read in the batch. Returns one record slot per read in
    /// input order (`None` for reads cancelled before completion) plus the
    /// per-phase timings.
    pub fn align(&self, reads: &ReadBatch) -> Result<(Vec<Option<BestScoreInfo>>, PhaseTimings)> {
        let n_reads = reads.len();
        let mut results: Vec<Option<BestScoreInfo>> = vec![None; n_reads];
        let mut timings = PhaseTimings::default();
        if n_reads == 0 {
            return Ok((results, timings));
        }
        log::info!("aligning {} reads on {} threads", n_reads, self.pool.current_num_threads());

        // Orientations interleaved: slot 2k is read k forward, 2k+1 its
        // reverse complement.
        let mut oriented: Vec<Vec<u8>> = Vec::with_capacity(2 * n_reads);
        for seq in &reads.seqs {
            oriented.push(seq.clone());
            oriented.push(reverse_complement(seq));
        }
        let max_len = reads.seqs.iter().map(|s| s.len()).max().unwrap_or(0);

        // Phase 1: end coordinates for both orientations
        let t = Instant::now();
        let anchors = self.phase1_forward(&oriented, max_len);
        timings.phase1 = t.elapsed();

        // Strand selection; zero scores become soft records immediately
        let mut pending: Vec<Pending> = Vec::with_capacity(n_reads);
        for k in 0..n_reads {
            let (Some(fwd), Some(rev)) = (anchors[2 * k], anchors[2 * k + 1]) else {
                continue; // cancelled mid-phase
            };
            let (strand, anchor) = if fwd.score >= rev.score {
                (Strand::Forward, fwd)
            } else {
                (Strand::Reverse, rev)
            };
            if anchor.score == 0 {
                results[k] = Some(BestScoreInfo::unaligned(k));
            } else {
                pending.push(Pending {
                    read_id: k,
                    strand,
                    anchor,
                });
            }
        }
        log::info!(
            "phase 1 done in {:.3}s, {} reads with a positive score",
            timings.phase1.as_secs_f64(),
            pending.len()
        );

        // Phase 1-reverse: start coordinates for the winners
        let t = Instant::now();
        let rqueries: Vec<Vec<u8>> = pending
            .iter()
            .map(|p| {
                let idx = 2 * p.read_id + usize::from(p.strand == Strand::Reverse);
                oriented[idx].iter().rev().copied().collect()
            })
            .collect();
        let end_anchors: Vec<EndAnchor> = pending.iter().map(|p| p.anchor).collect();
        let starts = self.phase1_reverse(&rqueries, &end_anchors, max_len);
        timings.phase1_rev = t.elapsed();

        let mut phase2_items: Vec<(Pending, StartAnchor)> = Vec::with_capacity(pending.len());
        for (p, start) in pending.into_iter().zip(starts) {
            let Some(start) = start else {
                continue; // cancelled mid-phase
            };
            if start.best_rev != p.anchor.score + 1 {
                return Err(AlignError::Invariant {
                    query: p.read_id,
                    details: format!(
                        "reverse sweep best {} is not forward best {} + 1",
                        start.best_rev, p.anchor.score
                    ),
                });
            }
            phase2_items.push((p, start));
        }
        log::info!("phase 1-reverse done in {:.3}s", timings.phase1_rev.as_secs_f64());

        // Phase 2: banded recompute + traceback, one read per work item
        let t = Instant::now();
        let graph = self.graph;
        let params = self.params;
        let cancel = &self.cancel;
        let oriented_ref = &oriented;
        let finished: Vec<Option<BestScoreInfo>> = self.pool.install(|| {
            phase2_items
                .into_par_iter()
                .map(|(p, start)| {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let seq = {
                        let idx = 2 * p.read_id + usize::from(p.strand == Strand::Reverse);
                        &oriented_ref[idx]
                    };
                    let mut info = BestScoreInfo {
                        query_id: p.read_id,
                        score: p.anchor.score,
                        ref_col_start: start.start_col,
                        ref_col_end: p.anchor.end_col,
                        qry_row_start: start.start_row,
                        qry_row_end: p.anchor.end_row,
                        strand: p.strand,
                        cigar: String::new(),
                        ref_columns: Vec::new(),
                    };
                    phase2::traceback(seq, graph, &params, &mut info)?;
                    Ok(Some(info))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        for info in finished.into_iter().flatten() {
            let slot = info.query_id;
            results[slot] = Some(info);
        }
        timings.phase2 = t.elapsed();
        log::info!("phase 2 done in {:.3}s", timings.phase2.as_secs_f64());

        Ok((results, timings))
    }

    /// Forward sweeps over every oriented sequence. `None` entries mark
    /// work skipped after cancellation.
    fn phase1_forward(&self, oriented: &[Vec<u8>], max_len: usize) -> Vec<Option<EndAnchor>> {
        let graph = self.graph;
        let params = self.params;
        let cancel = &self.cancel;
        match self.engine {
            EngineKind::Scalar => self.pool.install(|| {
                oriented
                    .par_iter()
                    .map(|q| {
                        if cancel.is_cancelled() {
                            None
                        } else {
                            Some(phase1::forward_scalar(q, graph, &params))
                        }
                    })
                    .collect()
            }),
            EngineKind::Lanes => {
                let width = simd::choose_lane_width(max_len, params.match_score, 0);
                let lanes = width.lanes();
                self.pool
                    .install(|| {
                        oriented
                            .par_chunks(lanes)
                            .map(|chunk| {
                                if cancel.is_cancelled() {
                                    return vec![None; chunk.len()];
                                }
                                let qs: Vec<&[u8]> = chunk.iter().map(|s| s.as_slice()).collect();
                                simd::phase1::forward_batch(width, &qs, graph, &params)
                                    .into_iter()
                                    .map(Some)
                                    .collect()
                            })
                            .collect::<Vec<Vec<_>>>()
                    })
                    .into_iter()
                    .flatten()
                    .collect()
            }
        }
    }

    /// Reverse sweeps over the winning orientations, reversed.
    fn phase1_reverse(
        &self,
        rqueries: &[Vec<u8>],
        anchors: &[EndAnchor],
        max_len: usize,
    ) -> Vec<Option<StartAnchor>> {
        let graph = self.graph;
        let params = self.params;
        let cancel = &self.cancel;
        match self.engine {
            EngineKind::Scalar => self.pool.install(|| {
                rqueries
                    .par_iter()
                    .zip(anchors.par_iter())
                    .map(|(q, &anchor)| {
                        if cancel.is_cancelled() {
                            None
                        } else {
                            Some(phase1::reverse_scalar(q, graph, &params, anchor))
                        }
                    })
                    .collect()
            }),
            EngineKind::Lanes => {
                // +1 headroom: the reverse sweep tags the end cell
                let width = simd::choose_lane_width(max_len, params.match_score, 1);
                let lanes = width.lanes();
                self.pool
                    .install(|| {
                        rqueries
                            .par_chunks(lanes)
                            .zip(anchors.par_chunks(lanes))
                            .map(|(chunk, anchor_chunk)| {
                                if cancel.is_cancelled() {
                                    return vec![None; chunk.len()];
                                }
                                let qs: Vec<&[u8]> = chunk.iter().map(|s| s.as_slice()).collect();
                                simd::phase1::reverse_batch(width, &qs, anchor_chunk, graph, &params)
                                    .into_iter()
                                    .map(Some)
                                    .collect()
                            })
                            .collect::<Vec<Vec<_>>>()
                    })
                    .into_iter()
                    .flatten()
                    .collect()
            }
        }
    }
}

// Tab-separated output, one record per query in input order.
//
// Columns: name, length, query row start/end, strand, start and end
// reference positions as (input vertex id, char offset) tuples, score,
// CIGAR, and the path of distinct input vertex ids in visit order.
// Queries with score 0 print zero coordinates and "." placeholders;
// cancelled queries print nothing.

use std::io::{self, Write};

use crate::align::best::BestScoreInfo;
use crate::graph::csr_char::CharDag;
use crate::io::query_reader::ReadBatch;

/// Original-vertex path along the visited reference columns, consecutive
/// duplicates removed.
fn path_string(graph: &CharDag, info: &BestScoreInfo) -> String {
    let mut path: Vec<u32> = Vec::new();
    path.push(graph.origin(info.ref_col_start as usize).0);
    for &col in &info.ref_columns {
        if col < info.ref_col_start || col > info.ref_col_end {
            continue;
        }
        let id = graph.origin(col as usize).0;
        if path.last() != Some(&id) {
            path.push(id);
        }
    }
    path.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn write_records<W: Write>(
    out: &mut W,
    graph: &CharDag,
    reads: &ReadBatch,
    records: &[Option<BestScoreInfo>],
) -> io::Result<()> {
    for (read_no, record) in records.iter().enumerate() {
        let Some(info) = record else {
            continue; // cancelled before a record was produced
        };
        let name = &reads.names[read_no];
        let len = reads.seqs[read_no].len();
        if info.score == 0 {
            writeln!(out, "{}\t{}\t0\t0\t{}\t.\t.\t0\t.\t.", name, len, info.strand.symbol())?;
            continue;
        }
        let (sv, so) = graph.origin(info.ref_col_start as usize);
        let (ev, eo) = graph.origin(info.ref_col_end as usize);
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t({},{})\t({},{})\t{}\t{}\t{}",
            name,
            len,
            info.qry_row_start,
            info.qry_row_end,
            info.strand.symbol(),
            sv,
            so,
            ev,
            eo,
            info.score,
            info.cigar,
            path_string(graph, info),
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::best::Strand;
    use crate::graph::csr::ChunkGraph;

    fn chain_dag() -> CharDag {
        let mut g = ChunkGraph::new(
            vec!["AC".into(), "GT".into()],
            vec![(0, 1)],
        )
        .unwrap();
        g.sort().unwrap();
        g.to_char_dag().unwrap()
    }

    #[test]
    fn formats_record_with_path() {
        let dag = chain_dag();
        let mut reads = ReadBatch::new();
        reads.names.push("r1".into());
        reads.seqs.push(b"ACGT".to_vec());

        let info = BestScoreInfo {
            query_id: 0,
            score: 4,
            ref_col_start: 0,
            ref_col_end: 3,
            qry_row_start: 0,
            qry_row_end: 3,
            strand: Strand::Forward,
            cigar: "4=".into(),
            ref_columns: vec![0, 1, 2, 3],
        };
        let mut out = Vec::new();
        write_records(&mut out, &dag, &reads, &[Some(info)]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "r1\t4\t0\t3\t+\t(0,0)\t(1,1)\t4\t4=\t0-1\n"
        );
    }

    #[test]
    fn zero_score_uses_placeholders() {
        let dag = chain_dag();
        let mut reads = ReadBatch::new();
        reads.names.push("r1".into());
        reads.seqs.push(b"TTTT".to_vec());

        let mut out = Vec::new();
        write_records(&mut out, &dag, &reads, &[Some(BestScoreInfo::unaligned(0))]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "r1\t4\t0\t0\t+\t.\t.\t0\t.\t.\n");
    }
}

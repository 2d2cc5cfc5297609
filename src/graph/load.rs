// Reference graph loaders.
//
// Two input shapes are supported:
//  - "txt": first line is the vertex count n; each of the following n lines
//    lists the out-neighbor ids of a vertex (ascending) followed by its DNA
//    label, whitespace-separated.
//  - "vg": a length-delimited stream of protobuf-encoded Graph messages as
//    written by the vg toolkit. Only Node{id, sequence} and Edge{from, to}
//    are consumed; unknown fields are skipped, reverse-strand edge flags are
//    rejected.
//
// Both loaders produce a verified, topologically sorted char DAG.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{AlignError, Result};
use crate::graph::csr::ChunkGraph;
use crate::graph::csr_char::CharDag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Vg,
    Txt,
}

impl GraphFormat {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "vg" => Ok(GraphFormat::Vg),
            "txt" => Ok(GraphFormat::Txt),
            other => Err(AlignError::InvalidArgument(format!(
                "invalid graph format {:?}, expected \"vg\" or \"txt\"",
                other
            ))),
        }
    }
}

/// Load, verify, topologically sort and char-expand a reference graph.
pub fn load_graph(format: GraphFormat, path: &Path) -> Result<CharDag> {
    let mut chunk = match format {
        GraphFormat::Txt => load_txt(path)?,
        GraphFormat::Vg => load_vg(path)?,
    };
    log::info!(
        "loaded reference graph: {} vertices, {} edges, total length {}",
        chunk.vertex_count(),
        chunk.edge_count(),
        chunk.total_ref_len()
    );
    chunk.sort()?;
    let dag = chunk.to_char_dag()?;
    log::info!(
        "char graph: {} vertices, {} edges, directed bandwidth {}",
        dag.vertex_count(),
        dag.edge_count(),
        dag.bandwidth()
    );
    Ok(dag)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        AlignError::InvalidArgument(format!("cannot open {}: {}", path.display(), e))
    })
}

fn load_txt(path: &Path) -> Result<ChunkGraph> {
    let reader = BufReader::new(open(path)?);
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| AlignError::MalformedGraph("empty graph file".into()))?
        .map_err(AlignError::Io)?;
    let n: usize = header.trim().parse().map_err(|_| {
        AlignError::MalformedGraph(format!("first line must be the vertex count, got {:?}", header))
    })?;

    let mut labels = Vec::with_capacity(n);
    let mut edges = Vec::new();
    for i in 0..n {
        let line = lines
            .next()
            .ok_or_else(|| {
                AlignError::MalformedGraph(format!("expected {} vertex lines, file ends after {}", n, i))
            })?
            .map_err(AlignError::Io)?;
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let label = tokens.pop().ok_or_else(|| {
            AlignError::MalformedGraph(format!("vertex line {} is empty", i + 1))
        })?;
        for token in tokens {
            let to: u32 = token.parse().map_err(|_| {
                AlignError::MalformedGraph(format!(
                    "vertex line {}: expected a neighbor id, got {:?}",
                    i + 1,
                    token
                ))
            })?;
            edges.push((i as u32, to));
        }
        labels.push(label.to_string());
    }
    ChunkGraph::new(labels, edges)
}

// --- vg binary format ------------------------------------------------------
//
// The stream layout is: varint group count, then per message a varint byte
// length followed by the encoded Graph. The handful of fields we need are
// decoded directly off the wire; everything else is skipped by wire type.

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or_else(|| {
                AlignError::MalformedGraph("truncated varint in vg stream".into())
            })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(AlignError::MalformedGraph("oversized varint in vg stream".into()));
            }
        }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.buf.len()).ok_or_else(|| {
            AlignError::MalformedGraph("truncated field in vg stream".into())
        })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Skip one field of the given wire type.
    fn skip(&mut self, wire_type: u64) -> Result<()> {
        match wire_type {
            0 => {
                self.varint()?;
            }
            1 => {
                self.bytes(8)?;
            }
            2 => {
                let len = self.varint()? as usize;
                self.bytes(len)?;
            }
            5 => {
                self.bytes(4)?;
            }
            other => {
                return Err(AlignError::MalformedGraph(format!(
                    "unsupported wire type {} in vg stream",
                    other
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct VgNode {
    id: u64,
    sequence: String,
}

fn parse_vg_node(buf: &[u8]) -> Result<VgNode> {
    let mut r = WireReader::new(buf);
    let mut node = VgNode::default();
    while !r.at_end() {
        let tag = r.varint()?;
        match (tag >> 3, tag & 7) {
            (1, 2) => {
                let len = r.varint()? as usize;
                node.sequence = String::from_utf8_lossy(r.bytes(len)?).into_owned();
            }
            (3, 0) => node.id = r.varint()?,
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(node)
}

fn parse_vg_edge(buf: &[u8]) -> Result<(u64, u64)> {
    let mut r = WireReader::new(buf);
    let (mut from, mut to) = (0u64, 0u64);
    while !r.at_end() {
        let tag = r.varint()?;
        match (tag >> 3, tag & 7) {
            (1, 0) => from = r.varint()?,
            (2, 0) => to = r.varint()?,
            (3, 0) | (4, 0) => {
                if r.varint()? != 0 {
                    return Err(AlignError::MalformedGraph(
                        "vg edge uses reverse strand flags; only forward DAG edges are supported".into(),
                    ));
                }
            }
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok((from, to))
}

fn parse_vg_graph(buf: &[u8], nodes: &mut Vec<VgNode>, edges: &mut Vec<(u64, u64)>) -> Result<()> {
    let mut r = WireReader::new(buf);
    while !r.at_end() {
        let tag = r.varint()?;
        match (tag >> 3, tag & 7) {
            (1, 2) => {
                let len = r.varint()? as usize;
                nodes.push(parse_vg_node(r.bytes(len)?)?);
            }
            (2, 2) => {
                let len = r.varint()? as usize;
                edges.push(parse_vg_edge(r.bytes(len)?)?);
            }
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(())
}

fn load_vg(path: &Path) -> Result<ChunkGraph> {
    let mut buf = Vec::new();
    open(path)?.read_to_end(&mut buf).map_err(AlignError::Io)?;
    // vg streams are conventionally gzip-compressed
    if buf.starts_with(&[0x1f, 0x8b]) {
        let mut inflated = Vec::new();
        MultiGzDecoder::new(buf.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| AlignError::MalformedGraph(format!("gzip stream error: {}", e)))?;
        buf = inflated;
    }
    let mut r = WireReader::new(&buf);

    let mut nodes: Vec<VgNode> = Vec::new();
    let mut edges: Vec<(u64, u64)> = Vec::new();
    while !r.at_end() {
        let count = r.varint()?;
        for _ in 0..count {
            let len = r.varint()? as usize;
            parse_vg_graph(r.bytes(len)?, &mut nodes, &mut edges)?;
        }
    }

    // vg node ids are sparse; map them to dense 0..n in ascending id order.
    nodes.sort_by_key(|n| n.id);
    let mut index: HashMap<u64, u32> = HashMap::with_capacity(nodes.len());
    for (dense, node) in nodes.iter().enumerate() {
        if index.insert(node.id, dense as u32).is_some() {
            return Err(AlignError::MalformedGraph(format!("duplicate vg node id {}", node.id)));
        }
    }

    let labels: Vec<String> = nodes.into_iter().map(|n| n.sequence).collect();
    let mut dense_edges = Vec::with_capacity(edges.len());
    for (from, to) in edges {
        let lookup = |id: u64| {
            index.get(&id).copied().ok_or_else(|| {
                AlignError::MalformedGraph(format!("vg edge references unknown node id {}", id))
            })
        };
        dense_edges.push((lookup(from)?, lookup(to)?));
    }
    ChunkGraph::new(labels, dense_edges)
}

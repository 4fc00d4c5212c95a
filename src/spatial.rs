//! Spatial index over edge-based node segments.

use anyhow::Result;
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

use crate::ebg::EdgeBasedNodeSegment;
use crate::error::ExtractionError;
use crate::geo::Coordinate;

pub type SegmentGeometry = GeomWithData<Line<[f64; 2]>, u32>;
pub type SegmentRTree = RTree<SegmentGeometry>;

/// Compact `segments` in place, keeping only start-point-eligible entries,
/// then bulk-load an R-tree over the survivors. The two input arrays must be
/// index-aligned.
pub fn filter_and_build_rtree(
    segments: &mut Vec<EdgeBasedNodeSegment>,
    node_is_startpoint: &[bool],
    coordinates: &[Coordinate],
) -> Result<SegmentRTree> {
    if segments.len() != node_is_startpoint.len() {
        return Err(ExtractionError::InconsistentInput(format!(
            "{} segments but {} start-point markers",
            segments.len(),
            node_is_startpoint.len()
        ))
        .into());
    }

    let mut out = 0;
    for index in 0..segments.len() {
        if node_is_startpoint[index] {
            segments[out] = segments[index];
            out += 1;
        }
    }
    if out == 0 {
        return Err(ExtractionError::NoSnappableEdges.into());
    }
    segments.truncate(out);

    let leaves: Vec<SegmentGeometry> = segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let u = coordinates[segment.u as usize];
            let v = coordinates[segment.v as usize];
            GeomWithData::new(
                Line::new([u.lon_deg(), u.lat_deg()], [v.lon_deg(), v.lat_deg()]),
                index as u32,
            )
        })
        .collect();
    Ok(RTree::bulk_load(leaves))
}

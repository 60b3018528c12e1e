//! Read identifier parsing
//!
//! Two identifier dialects carry the physical position of a read:
//! - legacy Illumina, 5 fields: `INSTR:lane:tile:x:y#index/1`
//! - Casava 1.8, 7+ fields: `INSTR:RUN:FLOWCELL:lane:tile:x:y 1:N:0:ATCG`
//!
//! Anything else is reported as a [`CoordinateParseError`], which callers
//! treat as "position unknown" rather than a failure.

use crate::coordinates::{FlowCellRegistry, SequenceCoordinates};
use crate::error::CoordinateParseError;

/// Parse a read identifier into its tile position
///
/// A leading `@` (FASTQ header marker) is ignored.
pub fn parse_identifier(
    identifier: &str,
    registry: &FlowCellRegistry,
) -> Result<SequenceCoordinates, CoordinateParseError> {
    let identifier = identifier.strip_prefix('@').unwrap_or(identifier);
    let fields: Vec<&str> = identifier.split(':').collect();

    match fields.len() {
        5 => {
            let raw_y = truncate_at(truncate_at(fields[4], '#'), ' ');
            Ok(SequenceCoordinates {
                flow_cell: registry.intern(""),
                lane: parse_field("lane", fields[1])?,
                tile: parse_field("tile", fields[2])?,
                x: parse_field("x", fields[3])?,
                y: parse_field("y", raw_y)?,
            })
        }
        n if n >= 7 => {
            let raw_y = truncate_at(fields[6], ' ');
            // Validate before interning so garbage never enters the registry
            let lane = parse_field("lane", fields[3])?;
            let tile = parse_field("tile", fields[4])?;
            let x = parse_field("x", fields[5])?;
            let y = parse_field("y", raw_y)?;
            Ok(SequenceCoordinates {
                flow_cell: registry.intern(fields[2]),
                lane,
                tile,
                x,
                y,
            })
        }
        n => Err(CoordinateParseError::FieldCount(n)),
    }
}

fn truncate_at(field: &str, delimiter: char) -> &str {
    match field.find(delimiter) {
        Some(pos) => &field[..pos],
        None => field,
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<u32, CoordinateParseError> {
    value
        .parse::<u32>()
        .map_err(|_| CoordinateParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::Coordinates;

    #[test]
    fn test_legacy_illumina_with_index_suffix() {
        let registry = FlowCellRegistry::new();
        let c = parse_identifier("INSTR:4:120:3050:8901#0/1", &registry).unwrap();
        assert_eq!((c.lane, c.tile, c.x, c.y), (4, 120, 3050, 8901));
        assert_eq!(registry.name(c.flow_cell).as_deref(), Some(""));
    }

    #[test]
    fn test_legacy_illumina_with_space_annotation() {
        let registry = FlowCellRegistry::new();
        let c = parse_identifier("@HWI-EAS209:7:1:1017:15230 length=36", &registry).unwrap();
        assert_eq!((c.lane, c.tile, c.x, c.y), (7, 1, 1017, 15230));
    }

    #[test]
    fn test_casava_18() {
        let registry = FlowCellRegistry::new();
        let c = parse_identifier("INSTR:RUN:FC001:2:5:1000:2000 1:N:0:ATCG", &registry).unwrap();
        assert_eq!(registry.name(c.flow_cell).as_deref(), Some("FC001"));
        assert_eq!((c.lane, c.tile, c.x, c.y), (2, 5, 1000, 2000));
    }

    #[test]
    fn test_casava_18_without_comment() {
        let registry = FlowCellRegistry::new();
        let c = parse_identifier("A00123:8:HFWKLDSXX:1:1101:10004:10019", &registry).unwrap();
        assert_eq!((c.lane, c.tile, c.x, c.y), (1, 1101, 10004, 10019));
    }

    #[test]
    fn test_same_flow_cell_same_id() {
        let registry = FlowCellRegistry::new();
        let a = parse_identifier("I:R:FCA:1:1:1:1", &registry).unwrap();
        let b = parse_identifier("I:R:FCA:2:3:4:5 2:Y:0:GG", &registry).unwrap();
        let c = parse_identifier("I:R:FCB:1:1:1:1", &registry).unwrap();
        assert_eq!(a.flow_cell, b.flow_cell);
        assert_ne!(a.flow_cell, c.flow_cell);
    }

    #[test]
    fn test_rejects_other_field_counts() {
        let registry = FlowCellRegistry::new();
        assert_eq!(
            parse_identifier("read_1", &registry),
            Err(CoordinateParseError::FieldCount(1))
        );
        assert_eq!(
            parse_identifier("a:b:c:d:e:f", &registry),
            Err(CoordinateParseError::FieldCount(6))
        );
    }

    #[test]
    fn test_rejects_non_numeric_and_negative_fields() {
        let registry = FlowCellRegistry::new();
        assert!(matches!(
            parse_identifier("INSTR:4:x:3050:8901", &registry),
            Err(CoordinateParseError::InvalidNumber { field: "tile", .. })
        ));
        assert!(matches!(
            parse_identifier("I:R:FC9:1:1:-5:3", &registry),
            Err(CoordinateParseError::InvalidNumber { field: "x", .. })
        ));
        assert!(registry.lookup("FC9").is_none());
    }

    #[test]
    fn test_json_round_trip_both_dialects() {
        let registry = FlowCellRegistry::new();
        for id in [
            "INSTR:4:120:3050:8901#0/1",
            "INSTR:RUN:FC001:2:5:1000:2000 1:N:0:ATCG",
        ] {
            let parsed = Coordinates::from(parse_identifier(id, &registry).unwrap());
            let json = parsed.to_json(&registry);
            assert_eq!(Coordinates::from_json(&json, &registry).unwrap(), parsed);
        }
    }
}

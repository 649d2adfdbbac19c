// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Seed File Loader
// ─────────────────────────────────────────────────────────────────────
//! Whitespace-delimited seed tables: `x y z prop1 [prop2 ...]`, one seed
//! per row. Blank lines and `#` comments are ignored.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use harvest_physics::prism::Point;
use harvest_types::{ensure_same_len, HarvestError, HarvestResult};

/// Seed locations and one value column per physical property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedTable {
    pub points: Vec<Point>,
    pub props: Vec<Vec<f64>>,
}

impl SeedTable {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Name the property columns, in file order.
    pub fn named(&self, names: &[&str]) -> HarvestResult<BTreeMap<String, Vec<f64>>> {
        ensure_same_len("property names/columns", names.len(), self.props.len())?;
        Ok(names
            .iter()
            .zip(&self.props)
            .map(|(n, col)| (n.to_string(), col.clone()))
            .collect())
    }
}

/// Parse a seed table from any buffered reader.
pub fn load_seeds<R: BufRead>(reader: R) -> HarvestResult<SeedTable> {
    let mut table = SeedTable::default();
    let mut width: Option<usize> = None;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = n + 1;
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let values = content
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|e| HarvestError::Parse {
                    line: lineno,
                    msg: format!("bad number {tok:?}: {e}"),
                })
            })
            .collect::<HarvestResult<Vec<f64>>>()?;
        if values.len() < 4 {
            return Err(HarvestError::Parse {
                line: lineno,
                msg: format!("expected x y z and at least one property, got {} columns", values.len()),
            });
        }
        match width {
            None => {
                width = Some(values.len());
                table.props = vec![Vec::new(); values.len() - 3];
            }
            Some(w) if w != values.len() => {
                return Err(HarvestError::Parse {
                    line: lineno,
                    msg: format!("expected {w} columns, got {}", values.len()),
                });
            }
            Some(_) => {}
        }
        table.points.push([values[0], values[1], values[2]]);
        for (col, &v) in table.props.iter_mut().zip(&values[3..]) {
            col.push(v);
        }
    }
    log::info!(
        "loaded {} seeds with {} property columns",
        table.len(),
        table.props.len()
    );
    Ok(table)
}

/// Parse a seed table from a file.
pub fn load_seeds_file(path: impl AsRef<Path>) -> HarvestResult<SeedTable> {
    let file = File::open(path.as_ref())?;
    load_seeds(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_rows() {
        let t = load_seeds("1 2 3 4 5\n6 7 8 9 -1".as_bytes()).unwrap();
        assert_eq!(t.points, vec![[1.0, 2.0, 3.0], [6.0, 7.0, 8.0]]);
        assert_eq!(t.props, vec![vec![4.0, 9.0], vec![5.0, -1.0]]);
    }

    #[test]
    fn test_single_row() {
        let t = load_seeds("1 2 3 4 5".as_bytes()).unwrap();
        assert_eq!(t.points, vec![[1.0, 2.0, 3.0]]);
        assert_eq!(t.props, vec![vec![4.0], vec![5.0]]);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# x y z density\n\n  100 200 300 500 # main body\n\n";
        let t = load_seeds(text.as_bytes()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.props, vec![vec![500.0]]);
    }

    #[test]
    fn test_too_few_columns() {
        let err = load_seeds("1 2 3".as_bytes()).unwrap_err();
        assert!(matches!(err, HarvestError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_ragged_rows() {
        let err = load_seeds("1 2 3 4\n1 2 3 4 5".as_bytes()).unwrap_err();
        assert!(matches!(err, HarvestError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_bad_number() {
        let err = load_seeds("1 2 x 4".as_bytes()).unwrap_err();
        assert!(matches!(err, HarvestError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_named_columns() {
        let t = load_seeds("1 2 3 4 5".as_bytes()).unwrap();
        let named = t.named(&["density", "susceptibility"]).unwrap();
        assert_eq!(named["density"], vec![4.0]);
        assert!(t.named(&["density"]).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_seeds_file("/nonexistent/seeds.txt"),
            Err(HarvestError::Io(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        let t = load_seeds("".as_bytes()).unwrap();
        assert!(t.is_empty());
    }
}

//! ASCII readers and writers for points, constraints, and triangles.
//!
//! Points: one per line, whitespace-separated `x y [z]`. Constraints: one
//! per line, two vertex indices. Triangles: one per line, three vertex
//! indices. Blank lines are skipped everywhere. Writers emit twelve
//! decimal digits, matching what the generator saves.

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::core::mesh::Tri;
use crate::geometry::point::Point;
use crate::input::Edge;

/// Reading or parsing failure, with the offending line.
#[derive(Debug, Error)]
pub enum InputIoError {
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A line that does not parse as the expected record.
    #[error("parse error on line {line}: {content:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The rejected line.
        content: String,
    },
}

/// Read points, one `x y [z]` per line.
///
/// # Errors
///
/// I/O failures and lines with fewer than two or more than three fields.
pub fn read_points<R: BufRead>(reader: R) -> Result<Vec<Point>, InputIoError> {
    let mut points = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|_| InputIoError::Parse {
                line: idx + 1,
                content: line.clone(),
            })
        };
        match fields.as_slice() {
            [x, y] => points.push(Point::new(parse(x)?, parse(y)?)),
            [x, y, z] => points.push(Point::with_z(parse(x)?, parse(y)?, parse(z)?)),
            _ => {
                return Err(InputIoError::Parse {
                    line: idx + 1,
                    content: line,
                })
            }
        }
    }
    Ok(points)
}

/// Read constraint edges, one `u v` pair per line.
///
/// # Errors
///
/// I/O failures and lines without exactly two integer fields.
pub fn read_constraints<R: BufRead>(reader: R) -> Result<Vec<Edge>, InputIoError> {
    let mut edges = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let parse = |s: &str| {
            s.parse::<u32>().map_err(|_| InputIoError::Parse {
                line: idx + 1,
                content: line.clone(),
            })
        };
        match fields.as_slice() {
            [u, v] => edges.push(Edge::new(parse(u)?, parse(v)?)),
            _ => {
                return Err(InputIoError::Parse {
                    line: idx + 1,
                    content: line,
                })
            }
        }
    }
    Ok(edges)
}

/// Write points, one per line with the carried coordinate.
///
/// # Errors
///
/// Underlying I/O failures.
pub fn write_points<W: Write>(mut writer: W, points: &[Point]) -> std::io::Result<()> {
    for p in points {
        writeln!(writer, "{:.12} {:.12} {:.12}", p.x, p.y, p.z)?;
    }
    Ok(())
}

/// Write constraint edges, one pair per line.
///
/// # Errors
///
/// Underlying I/O failures.
pub fn write_constraints<W: Write>(mut writer: W, edges: &[Edge]) -> std::io::Result<()> {
    for e in edges {
        writeln!(writer, "{} {}", e.v[0], e.v[1])?;
    }
    Ok(())
}

/// Write the triangle list, three vertex indices per line.
///
/// # Errors
///
/// Underlying I/O failures.
pub fn write_triangles<W: Write>(mut writer: W, tris: &[Tri]) -> std::io::Result<()> {
    for t in tris {
        writeln!(writer, "{} {} {}", t.v[0], t.v[1], t.v[2])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn points_roundtrip_through_the_ascii_format() {
        let points = vec![
            Point::with_z(0.25, 0.5, 1.0),
            Point::with_z(-1.5, 2.0, -0.125),
        ];
        let mut buf = Vec::new();
        write_points(&mut buf, &points).unwrap();
        let back = read_points(buf.as_slice()).unwrap();
        assert_eq!(back.len(), 2);
        for (orig, read) in points.iter().zip(&back) {
            assert_relative_eq!(orig.x, read.x, epsilon = 1e-9);
            assert_relative_eq!(orig.y, read.y, epsilon = 1e-9);
            assert_relative_eq!(orig.z, read.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn two_field_lines_default_z_and_blanks_are_skipped() {
        let text = "0 0\n\n1 0 3.5\n";
        let points = read_points(text.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].z, 0.0);
        assert_eq!(points[1].z, 3.5);
    }

    #[test]
    fn malformed_point_line_reports_its_number() {
        let text = "0 0\nnot a point\n";
        match read_points(text.as_bytes()) {
            Err(InputIoError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn constraints_roundtrip() {
        let edges = vec![Edge::new(0, 5), Edge::new(3, 1)];
        let mut buf = Vec::new();
        write_constraints(&mut buf, &edges).unwrap();
        assert_eq!(read_constraints(buf.as_slice()).unwrap(), edges);
    }

    #[test]
    fn triangles_write_one_per_line() {
        let tris = vec![Tri::new(0, 1, 2), Tri::new(2, 1, 3)];
        let mut buf = Vec::new();
        write_triangles(&mut buf, &tris).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0 1 2\n2 1 3\n");
    }
}

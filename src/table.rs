//! Plain-text tables for the `columns`, `discover` and `tier` listings.

use std::fmt::Write as _;

/// Cells wider than this are cut and end in `...`.
pub const MAX_CELL_WIDTH: usize = 72;

const GAP: &str = "  ";

fn clean_cell(value: &str) -> String {
    let flattened = value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>();
    if flattened.chars().count() <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut cut = flattened
        .chars()
        .take(MAX_CELL_WIDTH.saturating_sub(3))
        .collect::<String>();
    cut.push_str("...");
    cut
}

fn width(value: &str) -> usize {
    value.chars().count()
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (idx, width_limit) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str(GAP);
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or_default();
        let _ = write!(line, "{cell:<width_limit$}");
    }
    let _ = writeln!(output, "{}", line.trim_end());
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let headers = headers.iter().map(|h| clean_cell(h)).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|c| clean_cell(c)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| width(h).max(3)).collect::<Vec<_>>();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(width(cell));
        }
    }

    let mut output = String::new();
    push_line(&mut output, &headers, &widths);
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    push_line(&mut output, &rule, &widths);
    for row in &rows {
        push_line(&mut output, row, &widths);
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn columns_align_to_widest_cell() {
        let rendered = render_table(
            &strings(&["semantic", "column"]),
            &[strings(&["gpa", "Cumulative GPA"]), strings(&["aid", "-"])],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "semantic  column");
        assert_eq!(lines[1], "--------  --------------");
        assert_eq!(lines[2], "gpa       Cumulative GPA");
        assert_eq!(lines[3], "aid       -");
    }

    #[test]
    fn long_and_multiline_cells_are_flattened() {
        let long = "x".repeat(MAX_CELL_WIDTH + 10);
        let rendered = render_table(&strings(&["insight"]), &[vec![long], strings(&["a\nb"])]);
        assert!(
            rendered
                .lines()
                .any(|l| l.ends_with("...") && l.chars().count() == MAX_CELL_WIDTH)
        );
        assert!(rendered.lines().any(|l| l == "a b"));
    }
}

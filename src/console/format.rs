//! Grid rendering for the console.
//!
//! Cells are shown with the same text the CSV export writes, so an exported
//! report matches the grid verbatim.

use crate::models::{ResultSet, cell_text};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), text),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
    }
}

/// ASCII table with `+---+` rules. With `numbered`, a leading `#` column
/// carries 1-based row numbers for row-addressed commands.
pub fn format_grid(result: &ResultSet, numbered: bool) -> String {
    if result.columns.is_empty() {
        return "Empty set\n".to_string();
    }

    let mut headers: Vec<String> = Vec::with_capacity(result.columns.len() + 1);
    if numbered {
        headers.push("#".to_string());
    }
    headers.extend(result.columns.iter().cloned());

    let rows: Vec<Vec<(String, bool)>> = result
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let number = numbered.then(|| ((i + 1).to_string(), true));
            number
                .into_iter()
                .chain(
                    row.iter()
                        .map(|cell| (cell_text(cell), matches!(cell, JsonValue::Number(_)))),
                )
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in &rows {
        for (i, (text, _)) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(text.width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    output.push_str(
        &(headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("| {} ", pad(h, *w, Align::Center)))
            .collect::<String>()
            + "|\n"),
    );
    output.push_str(&separator);

    for row in &rows {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|((text, numeric), w)| {
                let align = if *numeric { Align::Right } else { Align::Left };
                format!("| {} ", pad(text, *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output.push_str(&separator);

    let row_text = if result.row_count() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        result.row_count(),
        row_text,
        result.execution_time_ms as f64 / 1000.0
    ));
    output
}

//! Box-drawing table renderer for list output.

use colored::Colorize;

/// Column alignment. Numeric columns read better right-aligned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

pub struct Table {
    headers: Vec<String>,
    alignments: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            alignments: vec![Align::Left; headers.len()],
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Right-align a column (0-indexed). Out-of-range indices are ignored.
    pub fn align_right(mut self, col: usize) -> Self {
        if let Some(slot) = self.alignments.get_mut(col) {
            *slot = Align::Right;
        }
        self
    }

    /// Add a row. Missing cells are filled with ""; extras are dropped.
    pub fn add_row(&mut self, cells: &[&str]) {
        self.rows.push(
            (0..self.headers.len())
                .map(|i| cells.get(i).unwrap_or(&"").to_string())
                .collect(),
        );
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }
        widths
    }

    fn pad(text: &str, width: usize, alignment: Align) -> String {
        match alignment {
            Align::Left => format!("{text:<width$}"),
            Align::Right => format!("{text:>width$}"),
        }
    }

    fn rule(widths: &[usize], left: char, mid: char, right: char) -> String {
        let spans: Vec<String> = widths.iter().map(|w| "\u{2500}".repeat(w + 2)).collect();
        format!("{left}{}{right}", spans.join(&mid.to_string()))
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut lines = vec![Self::rule(&widths, '\u{250c}', '\u{252c}', '\u{2510}')];

        let header: Vec<String> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!(" {} ", Self::pad(h, widths[i], self.alignments[i]).bold()))
            .collect();
        lines.push(format!("\u{2502}{}\u{2502}", header.join("\u{2502}")));
        lines.push(Self::rule(&widths, '\u{251c}', '\u{253c}', '\u{2524}'));

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, c)| format!(" {} ", Self::pad(c, widths[i], self.alignments[i])))
                .collect();
            lines.push(format!("\u{2502}{}\u{2502}", cells.join("\u{2502}")));
        }

        lines.push(Self::rule(&widths, '\u{2514}', '\u{2534}', '\u{2518}'));
        lines.join("\n")
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

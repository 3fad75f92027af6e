//! UI rendering and layout utilities

use crate::pipeline::{MeterReading, gauge_ratio};
use crate::state::SessionState;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Everything the screen needs for one frame
#[derive(Clone)]
pub struct UiState {
    pub source_name: String,
    pub reading: MeterReading,
    pub floor: f32,
    pub ceiling: f32,
    /// Added to every number shown, e.g. 130 for a positive dB scale
    pub label_shift: f32,
    pub session: SessionState,
    pub status: String,
    pub dropped_blocks: usize,
}

impl UiState {
    fn shown(&self, value: f32) -> f32 {
        value + self.label_shift
    }
}

/// Colour band for a position along the gauge
fn band_color(i: usize, width: usize) -> Color {
    if i < width / 3 {
        Color::Green
    } else if i < 2 * width / 3 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Shade for one gauge cell, by how much of the cell the level covers
fn fill_glyph(coverage: f64) -> char {
    const SHADES: [char; 4] = ['░', '▒', '▓', '█'];
    if coverage >= 1.0 {
        '█'
    } else if coverage > 0.0 {
        SHADES[((coverage * SHADES.len() as f64) as usize).min(SHADES.len() - 1)]
    } else {
        '░'
    }
}

/// Gauge bar filled to `ratio` of `width`, coloured in thirds
pub fn gauge_bar(width: usize, ratio: f64) -> Line<'static> {
    let level = ratio.clamp(0.0, 1.0) * width as f64;
    let spans = (0..width)
        .map(|i| {
            let glyph = fill_glyph(level - i as f64);
            Span::styled(glyph.to_string(), Style::default().fg(band_color(i, width)))
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

/// Scale labels under the bar, with a marker at the peak position
pub fn scale_labels(
    width: usize,
    floor: f32,
    ceiling: f32,
    shift: f32,
    peak_ratio: f64,
) -> Line<'static> {
    if width == 0 {
        return Line::default();
    }

    let label_at = |ratio: f32| format!("{:.0}", floor + (ceiling - floor) * ratio + shift);
    let mut cells: Vec<char> = vec![' '; width];
    let mut put = |start: usize, label: &str| {
        for (k, ch) in label.chars().enumerate() {
            if let Some(cell) = cells.get_mut(start + k) {
                *cell = ch;
            }
        }
    };

    put(0, &label_at(0.0));
    put(width / 3, &label_at(1.0 / 3.0));
    put(2 * width / 3, &label_at(2.0 / 3.0));
    let last = label_at(1.0);
    put(width.saturating_sub(last.chars().count()), &last);

    let peak_pos = (peak_ratio * (width - 1) as f64).round() as usize;
    let spans = cells
        .into_iter()
        .enumerate()
        .map(|(i, ch)| {
            if i == peak_pos {
                Span::styled("▲".to_string(), Style::default().fg(Color::White))
            } else {
                Span::styled(ch.to_string(), Style::default().fg(band_color(i, width)))
            }
        })
        .collect::<Vec<_>>();

    Line::from(spans)
}

/// Render the complete UI
pub fn render_ui(f: &mut Frame, state: &UiState) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(4),
        ])
        .split(size);

    // Source
    let device_block = Block::default().title("Source").borders(Borders::ALL);
    let device_text = Paragraph::new(state.source_name.as_str()).block(device_block);
    f.render_widget(device_text, chunks[0]);

    // Status
    let status_style = match state.session {
        SessionState::Running => Style::default(),
        SessionState::Idle => Style::default().fg(Color::Red),
    };
    let mut status = state.status.clone();
    if state.dropped_blocks > 0 {
        status.push_str(&format!(" ({} blocks dropped)", state.dropped_blocks));
    }
    let status_block = Block::default().title("Status").borders(Borders::ALL);
    let status_text = Paragraph::new(status).style(status_style).block(status_block);
    f.render_widget(status_text, chunks[1]);

    // Statistics
    let reading = state.reading;
    let stats = vec![
        Line::from(Span::styled(
            format!("dB:  {:.0}", state.shown(reading.value)),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Avg: {:.0} dB", state.shown(reading.average))),
        Line::from(format!("Max: {:.0} dB", state.shown(reading.peak))),
    ];
    let stats_text = Paragraph::new(stats).block(
        Block::default()
            .title("Level (r: reset, Esc/q: quit)")
            .borders(Borders::ALL),
    );
    f.render_widget(stats_text, chunks[2]);

    // Gauge with scale
    let border = crate::constants::ui::BAR_BORDER_WIDTH;
    let bar_width = (chunks[3].width as usize).saturating_sub(border);
    let value_ratio = gauge_ratio(reading.value, state.floor, state.ceiling);
    let peak_ratio = gauge_ratio(reading.peak, state.floor, state.ceiling);
    let bar_line = gauge_bar(bar_width, value_ratio);
    let label_line = scale_labels(
        bar_width,
        state.floor,
        state.ceiling,
        state.label_shift,
        peak_ratio,
    );
    let gauge = Paragraph::new(vec![bar_line, label_line]).block(
        Block::default()
            .title(format!("{:.0}%", value_ratio * 100.0))
            .borders(Borders::ALL),
    );
    f.render_widget(gauge, chunks[3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn bar_fills_by_ratio() {
        let line = gauge_bar(10, 0.5);
        let rendered = text(&line);
        assert_eq!(rendered.chars().count(), 10);
        assert_eq!(rendered.chars().filter(|&c| c == '█').count(), 5);
    }

    #[test]
    fn empty_and_full_bars() {
        assert!(text(&gauge_bar(6, 0.0)).chars().all(|c| c == '░'));
        assert!(text(&gauge_bar(6, 1.0)).chars().all(|c| c == '█'));
        assert!(text(&gauge_bar(6, 7.5)).chars().all(|c| c == '█'));
    }

    #[test]
    fn partial_cell_gets_a_shade() {
        assert_eq!(fill_glyph(0.1), '░');
        assert_eq!(fill_glyph(0.3), '▒');
        assert_eq!(fill_glyph(0.6), '▓');
        assert_eq!(fill_glyph(0.9), '█');
        assert_eq!(text(&gauge_bar(4, 0.6)), "██▒░");
    }

    #[test]
    fn bands_split_in_thirds() {
        assert_eq!(band_color(0, 9), Color::Green);
        assert_eq!(band_color(4, 9), Color::Yellow);
        assert_eq!(band_color(8, 9), Color::Red);
    }

    #[test]
    fn scale_labels_fit_width_and_mark_peak() {
        let line = scale_labels(40, -100.0, 0.0, 0.0, 0.5);
        let rendered = text(&line);
        assert_eq!(rendered.chars().count(), 40);
        assert!(rendered.starts_with("-100"));
        assert!(rendered.contains('▲'));
    }

    #[test]
    fn label_shift_moves_numbers() {
        let rendered = text(&scale_labels(40, -100.0, 0.0, 130.0, 0.0));
        assert!(rendered.contains("30"));
        assert!(rendered.ends_with("130"));
    }
}

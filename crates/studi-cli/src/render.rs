//! Incremental Markdown rendering for the live answer
//!
//! The whole accumulated answer is re-rendered on every token and replaces
//! the previous render in place. Re-rendering from scratch avoids the
//! half-styled artifacts that appending to an earlier partial render leaves
//! behind when a Markdown construct completes across two tokens.

use std::io::Write;

use crossterm::style::Stylize;
use crossterm::{cursor, queue, terminal};

/// Style the accumulated answer with lightweight Markdown rules:
/// headings and `**bold**` come out bold, inline code cyan, fenced code
/// blocks grey, list dashes as bullets. Unbalanced markers (mid-stream) are
/// left literal until their closing half arrives.
pub fn render_markdown(text: &str) -> String {
    let mut out = String::new();
    let mut in_code_block = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            out.push_str(&format!("{}\n", line.dark_grey()));
            continue;
        }
        let rendered = if let Some(heading) = heading_text(line) {
            format!("{}", heading.bold())
        } else if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            format!("  • {}", render_inline(item))
        } else {
            render_inline(line)
        };
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}

fn heading_text(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches('#');
    (rest.len() < line.len() && rest.starts_with(' ')).then(|| rest.trim_start())
}

fn render_inline(line: &str) -> String {
    let bolded = styled_pairs(line, "**", &|s| s.bold().to_string());
    styled_pairs(&bolded, "`", &|s| s.cyan().to_string())
}

/// Apply `style` to text between marker pairs; a trailing unpaired marker
/// stays literal
fn styled_pairs(line: &str, marker: &str, style: &dyn Fn(&str) -> String) -> String {
    let parts: Vec<&str> = line.split(marker).collect();
    if parts.len() == 1 {
        return line.to_string();
    }
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i % 2 == 1 {
            if i == parts.len() - 1 {
                // Closing marker not seen yet
                out.push_str(marker);
                out.push_str(part);
            } else {
                out.push_str(&style(part));
            }
        } else {
            out.push_str(part);
        }
    }
    out
}

/// Terminal region that a streamed answer repaints in place
#[derive(Debug, Default)]
pub struct LiveRegion {
    rendered_lines: u16,
}

impl LiveRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> u16 {
        self.rendered_lines
    }

    /// Replace the previous render with a fresh one
    pub fn update(&mut self, out: &mut impl Write, rendered: &str) -> std::io::Result<()> {
        self.clear(out)?;
        out.write_all(rendered.as_bytes())?;
        if !rendered.is_empty() && !rendered.ends_with('\n') {
            out.write_all(b"\n")?;
        }
        out.flush()?;
        self.rendered_lines = rendered.lines().count() as u16;
        Ok(())
    }

    /// Wipe the previous render, leaving the cursor at the region start
    pub fn clear(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if self.rendered_lines > 0 {
            queue!(
                out,
                cursor::MoveUp(self.rendered_lines),
                terminal::Clear(terminal::ClearType::FromCursorDown)
            )?;
            out.flush()?;
            self.rendered_lines = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_markers_are_consumed() {
        let out = render_markdown("Die **Mensa** ist offen.\n");
        assert!(out.contains("Mensa"));
        assert!(!out.contains("**"));
    }

    #[test]
    fn test_unbalanced_marker_stays_literal() {
        // Mid-stream the closing half has not arrived yet
        let out = render_markdown("Die **Men\n");
        assert!(out.contains("**Men"));
    }

    #[test]
    fn test_heading_is_styled_without_hashes() {
        let out = render_markdown("## Öffnungszeiten\n");
        assert!(out.contains("Öffnungszeiten"));
        assert!(!out.contains('#'));
    }

    #[test]
    fn test_hashes_inside_text_are_kept() {
        let out = render_markdown("Raum #217\n");
        assert!(out.contains("#217"));
    }

    #[test]
    fn test_list_dash_becomes_bullet() {
        let out = render_markdown("- Montag\n- Dienstag\n");
        assert_eq!(out.matches('•').count(), 2);
    }

    #[test]
    fn test_code_fence_lines_are_dropped() {
        let out = render_markdown("```\nlet x = 1;\n```\nText\n");
        assert!(out.contains("let x = 1;"));
        assert!(!out.contains("```"));
    }

    #[test]
    fn test_live_region_counts_rendered_lines() {
        let mut region = LiveRegion::new();
        let mut out = Vec::new();
        region.update(&mut out, "one\ntwo\n").unwrap();
        assert_eq!(region.lines(), 2);
        region.update(&mut out, "one\ntwo\nthree\n").unwrap();
        assert_eq!(region.lines(), 3);
        // The second update must move up over the first render to replace it
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("\x1b[2A"));
    }

    #[test]
    fn test_live_region_clear_resets() {
        let mut region = LiveRegion::new();
        let mut out = Vec::new();
        region.update(&mut out, "line\n").unwrap();
        region.clear(&mut out).unwrap();
        assert_eq!(region.lines(), 0);
    }
}

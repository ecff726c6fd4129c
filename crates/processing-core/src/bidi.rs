//! Minimal bidirectional reordering for baked captions.
//!
//! Captions are rasterized glyph by glyph left to right, so mixed
//! Hebrew/Arabic and Latin text has to be put into visual order first.
//! This is a run-level approximation of the Unicode bidi algorithm that is
//! good enough for single-paragraph captions: text is split into runs by
//! direction class, run order is reversed, RTL runs are mirrored and LTR
//! runs keep their character order.

/// Direction class of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Rtl,
    Ltr,
    Neutral,
}

/// Base direction of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDirection {
    Ltr,
    Rtl,
}

pub fn classify(c: char) -> CharClass {
    match c as u32 {
        0x0590..=0x05FF | 0x0600..=0x06FF | 0x0700..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF => {
            CharClass::Rtl
        }
        _ if c.is_alphanumeric() => CharClass::Ltr,
        _ => CharClass::Neutral,
    }
}

/// Direction of the first strong character; LTR when there is none.
pub fn paragraph_direction(text: &str) -> TextDirection {
    text.chars()
        .map(classify)
        .find(|class| *class != CharClass::Neutral)
        .map_or(TextDirection::Ltr, |class| match class {
            CharClass::Rtl => TextDirection::Rtl,
            _ => TextDirection::Ltr,
        })
}

pub fn contains_rtl(text: &str) -> bool {
    text.chars().any(|c| classify(c) == CharClass::Rtl)
}

#[derive(Debug)]
struct Run {
    class: CharClass,
    text: String,
}

fn split_runs(text: &str) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for c in text.chars() {
        let class = classify(c);
        match runs.last_mut() {
            Some(run) if run.class == class => run.text.push(c),
            _ => runs.push(Run {
                class,
                text: c.to_string(),
            }),
        }
    }
    runs
}

/// Neutral runs sitting between two runs of the same strong class take
/// that class, then equal neighbours are merged.
fn resolve_neutrals(runs: Vec<Run>) -> Vec<Run> {
    let classes: Vec<CharClass> = runs.iter().map(|r| r.class).collect();
    let mut resolved: Vec<Run> = Vec::with_capacity(runs.len());
    for (i, mut run) in runs.into_iter().enumerate() {
        if run.class == CharClass::Neutral && i > 0 && i + 1 < classes.len() {
            let (before, after) = (classes[i - 1], classes[i + 1]);
            if before == after && before != CharClass::Neutral {
                run.class = before;
            }
        }
        match resolved.last_mut() {
            Some(last) if last.class == run.class => last.text.push_str(&run.text),
            _ => resolved.push(run),
        }
    }
    resolved
}

/// Reorder one line from logical to visual order.
///
/// Text without RTL characters is returned unchanged.
pub fn visual_order(line: &str) -> String {
    if !contains_rtl(line) {
        return line.to_string();
    }
    resolve_neutrals(split_runs(line))
        .into_iter()
        .rev()
        .map(|run| match run.class {
            CharClass::Ltr => run.text,
            CharClass::Rtl | CharClass::Neutral => run.text.chars().rev().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_is_untouched() {
        assert_eq!(visual_order("GG EZ 123!"), "GG EZ 123!");
    }

    #[test]
    fn test_pure_hebrew_is_mirrored() {
        assert_eq!(visual_order("שלום"), "םולש");
    }

    #[test]
    fn test_mixed_caption_keeps_latin_group_together() {
        assert_eq!(visual_order("שלום WORLD 123"), "WORLD 123 םולש");
    }

    #[test]
    fn test_paragraph_direction() {
        assert_eq!(paragraph_direction("  שלום WORLD"), TextDirection::Rtl);
        assert_eq!(paragraph_direction("WORLD שלום"), TextDirection::Ltr);
        assert_eq!(paragraph_direction("123 !!"), TextDirection::Ltr);
        assert_eq!(paragraph_direction(""), TextDirection::Ltr);
    }
}

//! Script format:
//!
//! ```text
//! **SCENE 1**
//! **Voiceover:**
//! narration text
//!
//! **Visual Prompt:**
//! image description
//!
//! ---
//!
//! **SCENE 2**
//! ...
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::Scene;

const BLOCK_SEPARATOR: &str = "\n---\n";
const VOICEOVER_LABEL: &str = "**Voiceover:**";
const VISUAL_PROMPT_LABEL: &str = "**Visual Prompt:**";

static SCENE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*SCENE (\d+)\*\*").expect("valid scene header regex"));

pub const SAMPLE_SCRIPT: &str = "**SCENE 1**
**Voiceover:**
Every big project starts with a single small step. Today we take ours.

**Visual Prompt:**
A person lacing up running shoes on a city rooftop at sunrise, warm golden light, skyline in the background.

---

**SCENE 2**
**Voiceover:**
Build a little every day, and the little things add up faster than you think.

**Visual Prompt:**
A time-lapse style collage of a workshop bench: sketches, a laptop, coffee cups and a half-built wooden model, energetic and modern.";

/// Splits a script into scenes.
///
/// Blocks missing either a voiceover or a visual prompt are dropped. Duplicate
/// scene numbers are kept as separate entries.
pub fn parse(text: &str) -> Vec<Scene> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    text.split(BLOCK_SEPARATOR)
        .enumerate()
        .filter_map(|(index, block)| parse_block(index, block))
        .collect()
}

fn parse_block(index: usize, block: &str) -> Option<Scene> {
    let voiceover = voiceover_segment(block).unwrap_or_default();
    let visual_prompt = visual_prompt_segment(block).unwrap_or_default();
    if voiceover.is_empty() || visual_prompt.is_empty() {
        return None;
    }

    let scene_number = scene_number(block).unwrap_or(index as u32 + 1);
    Some(Scene::new(
        scene_number,
        voiceover.to_string(),
        visual_prompt.to_string(),
    ))
}

fn scene_number(block: &str) -> Option<u32> {
    SCENE_HEADER
        .captures(block)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|n| *n > 0)
}

fn voiceover_segment(block: &str) -> Option<&str> {
    let start = block.find(VOICEOVER_LABEL)? + VOICEOVER_LABEL.len();
    let rest = &block[start..];
    let end = rest
        .find(&format!("\n{}", VISUAL_PROMPT_LABEL))
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn visual_prompt_segment(block: &str) -> Option<&str> {
    let start = block.find(VISUAL_PROMPT_LABEL)? + VISUAL_PROMPT_LABEL.len();
    Some(block[start..].trim())
}

/// Formats scenes back into the script grammar understood by [`parse`].
pub fn render(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .map(|scene| {
            format!(
                "**SCENE {}**\n{}\n{}\n\n{}\n{}",
                scene.scene_number,
                VOICEOVER_LABEL,
                scene.voiceover,
                VISUAL_PROMPT_LABEL,
                scene.visual_prompt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_yields_no_scenes() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
        assert!(parse("\n\t\n").is_empty());
    }

    #[test]
    fn drops_block_with_empty_voiceover() {
        let script = "**SCENE 1**\n**Voiceover:**\nHi\n\n**Visual Prompt:**\nA cat\n---\n**SCENE 2**\n**Voiceover:**\n\n**Visual Prompt:**\nA dog";
        let scenes = parse(script);

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].scene_number, 1);
        assert_eq!(scenes[0].voiceover, "Hi");
        assert_eq!(scenes[0].visual_prompt, "A cat");
        assert!(!scenes[0].is_generating_image);
    }

    #[test]
    fn drops_block_with_missing_visual_prompt() {
        let script = "**SCENE 1**\n**Voiceover:**\nOnly words here\n---\n**SCENE 2**\n**Voiceover:**\nHello\n**Visual Prompt:**\nA boat";
        let scenes = parse(script);

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].scene_number, 2);
        assert_eq!(scenes[0].visual_prompt, "A boat");
    }

    #[test]
    fn keeps_surviving_blocks_in_original_order() {
        let script = "**SCENE 3**\n**Voiceover:**\nthree\n**Visual Prompt:**\nc\n---\n**SCENE 1**\n**Voiceover:**\none\n**Visual Prompt:**\na\n---\n**SCENE 2**\n**Voiceover:**\ntwo\n**Visual Prompt:**\n  ";
        let numbers: Vec<u32> = parse(script).iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, vec![3, 1]);
    }

    #[test]
    fn falls_back_to_position_without_header() {
        let script = "**Voiceover:**\nfirst\n**Visual Prompt:**\nx\n---\n**SCENE two**\n**Voiceover:**\nsecond\n**Visual Prompt:**\ny\n---\n**SCENE 0**\n**Voiceover:**\nthird\n**Visual Prompt:**\nz";
        let numbers: Vec<u32> = parse(script).iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn overflowing_scene_number_falls_back_to_position() {
        let script = "**SCENE 99999999999999**\n**Voiceover:**\nbig\n**Visual Prompt:**\nx";
        assert_eq!(parse(script)[0].scene_number, 1);
    }

    #[test]
    fn duplicate_scene_numbers_both_survive() {
        let script = "**SCENE 1**\n**Voiceover:**\na\n**Visual Prompt:**\nx\n---\n**SCENE 1**\n**Voiceover:**\nb\n**Visual Prompt:**\ny";
        let scenes = parse(script);
        assert_eq!(scenes.len(), 2);
        assert!(scenes.iter().all(|s| s.scene_number == 1));
    }

    #[test]
    fn multiline_segments_are_trimmed_but_kept_whole() {
        let script = "**SCENE 1**\n**Voiceover:**\n  line one\nline two  \n\n**Visual Prompt:**\nwide shot\nwith rain\n\n";
        let scenes = parse(script);
        assert_eq!(scenes[0].voiceover, "line one\nline two");
        assert_eq!(scenes[0].visual_prompt, "wide shot\nwith rain");
    }

    #[test]
    fn separator_must_be_its_own_line() {
        let script = "**SCENE 1**\n**Voiceover:**\nwait --- what\n**Visual Prompt:**\na dash-heavy prompt ---";
        let scenes = parse(script);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].voiceover, "wait --- what");
    }

    #[test]
    fn sample_script_parses_and_renders_back() {
        let scenes = parse(SAMPLE_SCRIPT);
        assert_eq!(scenes.len(), 2);
        assert_eq!(parse(&render(&scenes)), scenes);
    }
}

//! Ordered in-memory scene collection keyed by scene number.
//!
//! All mutation goes through `&mut self`, so there is exactly one writer at a
//! time. Observers follow changes through [`SceneStore::subscribe`].

use tokio::sync::broadcast;
use tracing::debug;

use super::{ImageRef, MediaRef, Scene, VisualSource};
use crate::error::{ReelError, Result};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Replaced { count: usize },
    Patched(u32),
    Appended(u32),
    Reordered,
}

/// A partial update for one scene. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenePatch {
    pub voiceover: Option<String>,
    pub visual_prompt: Option<String>,
    pub visual: Option<VisualSource>,
    pub audio: Option<Option<MediaRef>>,
    pub is_generating_image: Option<bool>,
}

impl ScenePatch {
    /// Marks a generation as outstanding and clears the previous image.
    pub fn generation_started() -> Self {
        Self {
            visual: Some(VisualSource::None),
            is_generating_image: Some(true),
            ..Default::default()
        }
    }

    pub fn generation_succeeded(image: ImageRef) -> Self {
        Self {
            visual: Some(VisualSource::Image(image)),
            is_generating_image: Some(false),
            ..Default::default()
        }
    }

    pub fn generation_failed() -> Self {
        Self {
            is_generating_image: Some(false),
            ..Default::default()
        }
    }

    pub fn text(voiceover: impl Into<String>, visual_prompt: impl Into<String>) -> Self {
        Self {
            voiceover: Some(voiceover.into()),
            visual_prompt: Some(visual_prompt.into()),
            ..Default::default()
        }
    }

    pub fn audio(audio: MediaRef) -> Self {
        Self {
            audio: Some(Some(audio)),
            ..Default::default()
        }
    }

    fn apply(&self, scene: &mut Scene) {
        if let Some(voiceover) = &self.voiceover {
            scene.voiceover = voiceover.clone();
        }
        if let Some(visual_prompt) = &self.visual_prompt {
            scene.visual_prompt = visual_prompt.clone();
        }
        if let Some(visual) = &self.visual {
            // a video is never replaced by generation results
            if !scene.has_video() || matches!(visual, VisualSource::Video(_)) {
                scene.visual = visual.clone();
            }
        }
        if let Some(audio) = &self.audio {
            scene.audio = audio.clone();
        }
        if let Some(generating) = self.is_generating_image {
            scene.is_generating_image = generating;
        }
    }
}

#[derive(Debug)]
pub struct SceneStore {
    scenes: Vec<Scene>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            scenes: Vec::new(),
            events,
        }
    }

    pub fn with_scenes(scenes: Vec<Scene>) -> Self {
        let mut store = Self::new();
        store.scenes = scenes;
        store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn get(&self, scene_number: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_number == scene_number)
    }

    /// Swaps in a whole new collection. The only way to shrink the store.
    pub fn replace_all(&mut self, scenes: Vec<Scene>) {
        self.scenes = scenes;
        debug!(count = self.scenes.len(), "scene store replaced");
        self.publish(StoreEvent::Replaced {
            count: self.scenes.len(),
        });
    }

    pub fn clear(&mut self) {
        self.replace_all(Vec::new());
    }

    /// Applies `patch` to every scene carrying `scene_number`.
    ///
    /// Returns `false` without touching anything when the key is gone, which
    /// happens when a late generation result arrives after a reset.
    pub fn patch_by_key(&mut self, scene_number: u32, patch: &ScenePatch) -> bool {
        let mut matched = false;
        for scene in self
            .scenes
            .iter_mut()
            .filter(|s| s.scene_number == scene_number)
        {
            patch.apply(scene);
            matched = true;
        }

        if matched {
            self.publish(StoreEvent::Patched(scene_number));
        } else {
            debug!(scene_number, "patch for missing scene ignored");
        }
        matched
    }

    /// Appends `scene` under the next free number (`max + 1`, or 1 when empty).
    /// Any number already on `scene` is overwritten.
    pub fn append_one(&mut self, mut scene: Scene) -> Result<u32> {
        let scene_number = self.next_scene_number().ok_or_else(|| {
            ReelError::InvalidScene(format!(
                "scene numbers are exhausted; the highest is already {}",
                u32::MAX
            ))
        })?;
        scene.scene_number = scene_number;
        self.scenes.push(scene);
        self.publish(StoreEvent::Appended(scene_number));
        Ok(scene_number)
    }

    /// `None` once the highest number can't be incremented.
    pub fn next_scene_number(&self) -> Option<u32> {
        match self.scenes.iter().map(|s| s.scene_number).max() {
            Some(max) => max.checked_add(1),
            None => Some(1),
        }
    }

    /// Reorders by permutation: `order[i]` is the current index of the scene
    /// that should end up at position `i`. Scene numbers are then rewritten to
    /// `1..=n` in the new order.
    pub fn reorder(&mut self, order: &[usize]) -> Result<()> {
        let n = self.scenes.len();
        let mut seen = vec![false; n];
        if order.len() != n {
            return Err(ReelError::InvalidScene(format!(
                "reorder expects {} positions, got {}",
                n,
                order.len()
            )));
        }
        for &index in order {
            if index >= n || seen[index] {
                return Err(ReelError::InvalidScene(format!(
                    "reorder position {} is out of range or repeated",
                    index
                )));
            }
            seen[index] = true;
        }

        let mut slots: Vec<Option<Scene>> = self.scenes.drain(..).map(Some).collect();
        self.scenes = order
            .iter()
            .filter_map(|&index| slots[index].take())
            .collect();
        self.renumber();
        self.publish(StoreEvent::Reordered);
        Ok(())
    }

    /// Drag-and-drop move between 0-based positions.
    pub fn move_scene(&mut self, from: usize, to: usize) -> Result<()> {
        let n = self.scenes.len();
        if from >= n || to >= n {
            return Err(ReelError::InvalidScene(format!(
                "cannot move position {} to {} in a reel of {} scenes",
                from + 1,
                to + 1,
                n
            )));
        }
        let mut order: Vec<usize> = (0..n).collect();
        let moved = order.remove(from);
        order.insert(to, moved);
        self.reorder(&order)
    }

    fn renumber(&mut self) {
        for (index, scene) in self.scenes.iter_mut().enumerate() {
            scene.scene_number = index as u32 + 1;
        }
    }

    fn publish(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::parse;

    fn scene(n: u32) -> Scene {
        Scene::new(n, format!("voice {}", n), format!("prompt {}", n))
    }

    fn numbers(store: &SceneStore) -> Vec<u32> {
        store.scenes().iter().map(|s| s.scene_number).collect()
    }

    #[test]
    fn append_on_empty_store_starts_at_one() {
        let mut store = SceneStore::new();
        assert_eq!(store.append_one(scene(42)).unwrap(), 1);
        assert_eq!(numbers(&store), vec![1]);
    }

    #[test]
    fn append_uses_max_even_when_not_at_tail() {
        let mut store = SceneStore::with_scenes(vec![scene(2), scene(7), scene(3)]);
        assert_eq!(store.append_one(scene(0)).unwrap(), 8);
        assert_eq!(numbers(&store), vec![2, 7, 3, 8]);
    }

    #[test]
    fn append_after_highest_number_is_refused() {
        let script = "**SCENE 4294967295**\n**Voiceover:**\nlast\n**Visual Prompt:**\nend";
        let mut store = SceneStore::with_scenes(parse(script));
        let mut events = store.subscribe();

        assert!(matches!(
            store.append_one(scene(0)),
            Err(ReelError::InvalidScene(_))
        ));
        assert_eq!(numbers(&store), vec![u32::MAX]);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn patch_for_missing_key_is_a_no_op() {
        let mut store = SceneStore::with_scenes(vec![scene(1), scene(2)]);
        let before = store.scenes().to_vec();
        let mut events = store.subscribe();

        let applied = store.patch_by_key(9, &ScenePatch::generation_failed());

        assert!(!applied);
        assert_eq!(store.scenes(), before.as_slice());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn patch_updates_only_named_fields() {
        let mut store = SceneStore::with_scenes(vec![scene(1), scene(2)]);
        let image = ImageRef::from_base64("image/jpeg", "AAAA");

        store.patch_by_key(2, &ScenePatch::generation_started());
        assert!(store.get(2).unwrap().is_generating_image);

        store.patch_by_key(2, &ScenePatch::generation_succeeded(image.clone()));
        let patched = store.get(2).unwrap();
        assert_eq!(patched.image(), Some(&image));
        assert!(!patched.is_generating_image);
        assert_eq!(patched.voiceover, "voice 2");
        assert_eq!(store.get(1).unwrap().visual, VisualSource::None);
    }

    #[test]
    fn generation_result_never_overwrites_video() {
        let mut video_scene = scene(1);
        video_scene.visual = VisualSource::Video(MediaRef::from_path("clip.mp4"));
        let mut store = SceneStore::with_scenes(vec![video_scene]);

        store.patch_by_key(
            1,
            &ScenePatch::generation_succeeded(ImageRef::from_base64("image/jpeg", "AAAA")),
        );
        assert!(store.get(1).unwrap().has_video());
    }

    #[test]
    fn reorder_renumbers_in_presentation_order() {
        let script = "**SCENE 1**\n**Voiceover:**\na\n**Visual Prompt:**\nx\n---\n**SCENE 2**\n**Voiceover:**\nb\n**Visual Prompt:**\ny\n---\n**SCENE 3**\n**Voiceover:**\nc\n**Visual Prompt:**\nz";
        let mut store = SceneStore::with_scenes(parse(script));

        store.reorder(&[2, 0, 1]).unwrap();

        assert_eq!(numbers(&store), vec![1, 2, 3]);
        let voiceovers: Vec<&str> = store.scenes().iter().map(|s| s.voiceover.as_str()).collect();
        assert_eq!(voiceovers, vec!["c", "a", "b"]);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let mut store = SceneStore::with_scenes(vec![scene(1), scene(2)]);
        assert!(store.reorder(&[0, 0]).is_err());
        assert!(store.reorder(&[0]).is_err());
        assert!(store.reorder(&[0, 5]).is_err());
        assert_eq!(numbers(&store), vec![1, 2]);
    }

    #[test]
    fn move_scene_splices_and_renumbers() {
        let mut store = SceneStore::with_scenes(vec![scene(1), scene(2), scene(3), scene(4)]);
        store.move_scene(0, 2).unwrap();

        let voiceovers: Vec<&str> = store.scenes().iter().map(|s| s.voiceover.as_str()).collect();
        assert_eq!(voiceovers, vec!["voice 2", "voice 3", "voice 1", "voice 4"]);
        assert_eq!(numbers(&store), vec![1, 2, 3, 4]);
    }

    #[test]
    fn observers_see_each_mutation() {
        let mut store = SceneStore::new();
        let mut events = store.subscribe();

        store.replace_all(vec![scene(1)]);
        store.patch_by_key(1, &ScenePatch::text("new voice", "new prompt"));
        store.append_one(scene(0)).unwrap();
        store.move_scene(1, 0).unwrap();

        assert_eq!(events.try_recv().unwrap(), StoreEvent::Replaced { count: 1 });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Patched(1));
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Appended(2));
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Reordered);
    }
}

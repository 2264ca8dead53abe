use std::collections::HashMap;

/// Episode numbers for the new videos of one discovery pass.
///
/// The source lists newest first, so the `i`-th newest of `total` new videos
/// gets `existing + total - i`: the oldest new video receives the lowest
/// number and numbering continues after what is already stored.
#[derive(Debug, Clone, Default)]
pub struct EpisodePlan {
    numbers: HashMap<String, u32>,
}

impl EpisodePlan {
    pub fn assign<S: AsRef<str>>(existing: u32, newest_first: &[S]) -> Self {
        let total = newest_first.len() as u32;
        let numbers = newest_first
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_ref().to_string(), existing + total - i as u32))
            .collect();
        Self { numbers }
    }

    pub fn number_for(&self, video_id: &str) -> Option<u32> {
        self.numbers.get(video_id).copied()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

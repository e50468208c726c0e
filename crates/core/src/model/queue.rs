use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::model::ids::SkillId;

/// A skill still waiting to be examined in the current batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSkill {
    pub skill_id: SkillId,
    pub skill_name: String,
}

impl PendingSkill {
    #[must_use]
    pub fn new(skill_id: SkillId, skill_name: impl Into<String>) -> Self {
        Self {
            skill_id,
            skill_name: skill_name.into(),
        }
    }
}

/// FIFO of skills left in an assessment batch.
///
/// Entries are unique by skill id. Completing an exam removes only that
/// skill's entry; the relative order of the rest never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSkillQueue {
    entries: VecDeque<PendingSkill>,
}

impl PendingSkillQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue, keeping the first occurrence of each skill id.
    #[must_use]
    pub fn from_skills(skills: impl IntoIterator<Item = PendingSkill>) -> Self {
        let mut queue = Self::new();
        for skill in skills {
            queue.push(skill);
        }
        queue
    }

    /// Append a skill. Returns `false` if it is already queued.
    pub fn push(&mut self, skill: PendingSkill) -> bool {
        if self.contains(skill.skill_id) {
            return false;
        }
        self.entries.push_back(skill);
        true
    }

    /// Remove the entry for `skill_id`, wherever it sits.
    pub fn remove(&mut self, skill_id: SkillId) -> Option<PendingSkill> {
        let index = self.entries.iter().position(|s| s.skill_id == skill_id)?;
        self.entries.remove(index)
    }

    #[must_use]
    pub fn front(&self) -> Option<&PendingSkill> {
        self.entries.front()
    }

    #[must_use]
    pub fn get(&self, skill_id: SkillId) -> Option<&PendingSkill> {
        self.entries.iter().find(|s| s.skill_id == skill_id)
    }

    #[must_use]
    pub fn contains(&self, skill_id: SkillId) -> bool {
        self.get(skill_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSkill> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: u64, name: &str) -> PendingSkill {
        PendingSkill::new(SkillId::new(id), name)
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut queue = PendingSkillQueue::from_skills([skill(1, "SQL"), skill(2, "Rust")]);
        assert!(!queue.push(skill(1, "SQL again")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(SkillId::new(1)).unwrap().skill_name, "SQL");
    }

    #[test]
    fn removing_a_middle_entry_keeps_order() {
        let mut queue =
            PendingSkillQueue::from_skills([skill(1, "SQL"), skill(2, "Rust"), skill(3, "Go")]);
        assert_eq!(queue.remove(SkillId::new(2)).unwrap().skill_name, "Rust");
        let ids: Vec<_> = queue.iter().map(|s| s.skill_id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn removing_unknown_skill_is_noop() {
        let mut queue = PendingSkillQueue::from_skills([skill(1, "SQL")]);
        assert!(queue.remove(SkillId::new(9)).is_none());
        assert_eq!(queue.front().unwrap().skill_id, SkillId::new(1));
    }
}

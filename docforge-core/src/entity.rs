use std::collections::{HashMap, HashSet};

/// 以字符串 ID 标识的实体。ID 由调用方在派发前生成（通常为 UUID）。
pub trait Entity: Clone {
    fn id(&self) -> &str;
}

/// 对实体的浅层修改。实现方不得改动实体 ID。
pub trait EntityPatch<T> {
    fn apply_to(&self, entity: &mut T);
}

/// 按 ID 索引的实体集合，同时记录插入顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState<T> {
    ids: Vec<String>,
    entities: HashMap<String, T>,
}

impl<T> Default for EntityState<T> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entities: HashMap::new(),
        }
    }
}

impl<T: Entity> EntityState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entities.get(id)
    }

    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// 按插入顺序遍历实体。
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.ids.iter().filter_map(|id| self.entities.get(id))
    }

    /// 插入实体。ID 已存在时不做任何修改并返回 `false`。
    pub fn add_one(&mut self, entity: T) -> bool {
        let id = entity.id().to_string();
        if self.entities.contains_key(&id) {
            return false;
        }
        self.ids.push(id.clone());
        self.entities.insert(id, entity);
        true
    }

    /// 将修改浅合并到已有实体；ID 不存在时返回 `false`。
    pub fn update_one<P>(&mut self, id: &str, patch: &P) -> bool
    where
        P: EntityPatch<T> + ?Sized,
    {
        match self.entities.get_mut(id) {
            Some(entity) => {
                patch.apply_to(entity);
                true
            }
            None => false,
        }
    }

    pub fn remove_one(&mut self, id: &str) -> Option<T> {
        let removed = self.entities.remove(id)?;
        self.ids.retain(|existing| existing != id);
        Some(removed)
    }

    /// 批量删除，返回实际删除的数量。
    pub fn remove_many<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let targets: HashSet<&str> = ids
            .into_iter()
            .filter(|id| self.entities.contains_key(*id))
            .collect();
        if targets.is_empty() {
            return 0;
        }
        for id in &targets {
            self.entities.remove(*id);
        }
        self.ids.retain(|id| !targets.contains(id.as_str()));
        targets.len()
    }

    /// 整体替换集合内容。重复 ID 以首次出现者为准。
    pub fn set_all<I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.ids.clear();
        self.entities.clear();
        for entity in entities {
            self.add_one(entity);
        }
    }

    /// 对实体做受控的就地修改，仅限本 crate 内维护关系数组的场景使用。
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entities.get_mut(id)
    }
}

impl<T: Entity> FromIterator<T> for EntityState<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut state = Self::new();
        state.set_all(iter);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        text: String,
    }

    impl Entity for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    struct Retext(&'static str);

    impl EntityPatch<Note> for Retext {
        fn apply_to(&self, entity: &mut Note) {
            entity.text = self.0.to_string();
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn add_one_ignores_duplicate_ids() {
        let mut state = EntityState::new();
        assert!(state.add_one(note("a", "first")));
        assert!(!state.add_one(note("a", "second")));
        assert_eq!(state.len(), 1);
        assert_eq!(state.get("a").unwrap().text, "first");
    }

    #[test]
    fn update_one_merges_and_ignores_unknown_ids() {
        let mut state: EntityState<Note> = [note("a", "x")].into_iter().collect();
        assert!(state.update_one("a", &Retext("y")));
        assert_eq!(state.get("a").unwrap().text, "y");
        assert_eq!(state.get("a").unwrap().id, "a");

        let before = state.clone();
        assert!(!state.update_one("missing", &Retext("z")));
        assert_eq!(state, before);
    }

    #[test]
    fn removals_keep_remaining_order() {
        let mut state: EntityState<Note> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| note(id, id))
            .collect();

        assert!(state.remove_one("b").is_some());
        assert!(state.remove_one("b").is_none());
        assert_eq!(state.remove_many(["a", "d", "zzz"]), 2);
        assert_eq!(state.ids(), &["c".to_string()]);
        let texts: Vec<&str> = state.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["c"]);
    }

    #[test]
    fn set_all_replaces_contents_in_order() {
        let mut state: EntityState<Note> = [note("old", "o")].into_iter().collect();
        state.set_all(vec![note("b", "1"), note("a", "2")]);
        assert!(!state.contains("old"));
        assert_eq!(state.ids(), &["b".to_string(), "a".to_string()]);
    }
}

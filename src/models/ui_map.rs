//! UI Map 模型：逻辑元素名 → 选择器候选列表

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 一个逻辑元素的定位方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementLocator {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ElementLocator {
    /// 主选择器在前，后备选择器按声明顺序
    pub fn candidates(&self) -> Vec<String> {
        std::iter::once(self.primary.clone())
            .chain(self.fallbacks.iter().cloned())
            .collect()
    }
}

/// 一张 UI Map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiMap {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub elements: HashMap<String, ElementLocator>,
}

impl UiMap {
    pub fn element(&self, name: &str) -> Option<&ElementLocator> {
        self.elements.get(name)
    }
}

/// 按名称索引的 UI Map 集合
#[derive(Debug, Clone, Default)]
pub struct UiMapSet {
    maps: HashMap<String, UiMap>,
}

impl UiMapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名 Map 后插入的覆盖先插入的
    pub fn insert(&mut self, map: UiMap) {
        self.maps.insert(map.name.clone(), map);
    }

    pub fn get(&self, name: &str) -> Option<&UiMap> {
        self.maps.get(name)
    }

    /// 按 id 查找（场景的 ui_map_id 引用的是 id）
    pub fn find_by_id(&self, id: &str) -> Option<&UiMap> {
        self.maps.values().find(|m| m.id.as_deref() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl FromIterator<UiMap> for UiMapSet {
    fn from_iter<I: IntoIterator<Item = UiMap>>(iter: I) -> Self {
        let mut set = UiMapSet::new();
        for map in iter {
            set.insert(map);
        }
        set
    }
}

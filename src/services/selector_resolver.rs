//! 选择器解析 - 业务能力层
//!
//! 把步骤里的 target 变成按优先级排列的选择器候选列表。

use tracing::debug;

use crate::models::UiMapSet;

/// 选择器解析器
///
/// 职责：
/// - `map.element` 形式的引用查 UI Map，返回 primary + fallbacks
/// - 场景绑定了默认 UI Map 时，裸元素名也查它
/// - 其余一律视为原始选择器
#[derive(Debug, Clone, Default)]
pub struct SelectorResolver {
    ui_maps: UiMapSet,
    default_map: Option<String>,
}

impl SelectorResolver {
    pub fn new(ui_maps: UiMapSet) -> Self {
        Self {
            ui_maps,
            default_map: None,
        }
    }

    /// 设置裸元素名使用的 UI Map（按名称）
    pub fn with_default_map(mut self, map_name: impl Into<String>) -> Self {
        self.default_map = Some(map_name.into());
        self
    }

    pub fn ui_maps(&self) -> &UiMapSet {
        &self.ui_maps
    }

    /// 解析 target，结果至少包含一个候选
    pub fn resolve(&self, target: &str) -> Vec<String> {
        if let Some((map_name, element_name)) = split_reference(target) {
            if let Some(locator) = self
                .ui_maps
                .get(map_name)
                .and_then(|map| map.element(element_name))
            {
                debug!("UI Map 引用 {} → {:?}", target, locator.candidates());
                return locator.candidates();
            }
        }

        if let Some(locator) = self
            .default_map
            .as_deref()
            .and_then(|name| self.ui_maps.get(name))
            .and_then(|map| map.element(target))
        {
            return locator.candidates();
        }

        vec![target.to_string()]
    }
}

/// `login.username` → ("login", "username")；以 `.` 开头的 CSS 类选择器不算
fn split_reference(target: &str) -> Option<(&str, &str)> {
    if target.starts_with('.') {
        return None;
    }
    let (map, element) = target.split_once('.')?;
    if map.is_empty() || element.is_empty() {
        return None;
    }
    Some((map, element))
}

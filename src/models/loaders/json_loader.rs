use crate::error::{EngineError, EngineResult};
use crate::models::scenario::Scenario;
use crate::models::ui_map::{UiMap, UiMapSet};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 JSON 文件加载并校验场景
///
/// 文件不存在时返回 `Ok(None)`，格式或步骤不合法时返回 `Configuration` 错误
pub async fn load_scenario_file(path: &Path) -> EngineResult<Option<Scenario>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::Io(e)),
    };

    Scenario::from_json(&content)
        .map(Some)
        .map_err(|e| match e {
            EngineError::Configuration(msg) => {
                EngineError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
}

/// 从 JSON 文件加载单个 UI Map
pub async fn load_ui_map_file(path: &Path) -> Result<UiMap> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取UI Map文件: {}", path.display()))?;

    let map: UiMap = serde_json::from_str(&content)
        .with_context(|| format!("无法解析UI Map文件: {}", path.display()))?;

    Ok(map)
}

/// 从文件夹中加载属于某个项目的全部 UI Map
///
/// 未标注 project_id 的 Map 对所有项目可见；单个文件解析失败只记录警告
pub async fn load_ui_maps(folder_path: &Path, project_id: Option<&str>) -> Result<UiMapSet> {
    let folder = PathBuf::from(folder_path);
    let mut set = UiMapSet::new();

    if !folder.exists() {
        tracing::debug!("UI Map 目录不存在: {}", folder.display());
        return Ok(set);
    }

    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }

        match load_ui_map_file(&path).await {
            Ok(map) => {
                let visible = match (&map.project_id, project_id) {
                    (Some(owner), Some(wanted)) => owner == wanted,
                    _ => true,
                };
                if visible {
                    tracing::debug!("已加载 UI Map: {} ({} 个元素)", map.name, map.elements.len());
                    set.insert(map);
                }
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(set)
}

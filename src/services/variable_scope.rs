//! 变量作用域 - 业务能力层
//!
//! 一次顶层运行只有一个作用域，run_scenario 调用的子场景共享它：
//! 子场景写入的变量在返回后对父场景可见，反之亦然。

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("占位符正则编译失败"));

/// 运行期变量表
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    vars: HashMap<String, String>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入变量，同名覆盖
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// 替换 `{{name}}` 占位符
    ///
    /// 单遍替换，替换结果中的占位符不会再次展开；
    /// 未定义的变量原样保留
    pub fn substitute(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match self.vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// 模板中引用了但尚未定义的变量名
    pub fn undefined_in(&self, template: &str) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .filter(|name| !self.vars.contains_key(name))
            .collect()
    }
}

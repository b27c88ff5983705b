//! 动作指令解析：从模型的自由文本中提取一条 ACTION 指令
//!
//! 行导向、尽力而为，任何输入都不会报错：
//! - `ACTION:` 行（去空白、大小写不敏感）给出动作类型
//! - `FILE_PATH` / `EXPLANATION` / `SUMMARY` 取首个匹配行的值
//! - `CONTENT:` 之后到最后一个 ``` 之间为正文；没有闭合 ``` 时取到末尾
//!
//! 构造失败（缺字段、未知类型）交给 ActionRegistry 处理。

use std::collections::BTreeMap;

pub const ACTION_KEYWORD: &str = "ACTION:";
pub const FILE_PATH: &str = "FILE_PATH";
pub const EXPLANATION: &str = "EXPLANATION";
pub const SUMMARY: &str = "SUMMARY";
pub const CONTENT: &str = "CONTENT";
const CONTENT_MARKER: &str = "CONTENT:";
const FENCE: &str = "```";

/// 头部字段（固定集合）
const HEADER_FIELDS: [&str; 3] = [FILE_PATH, EXPLANATION, SUMMARY];

/// 动作参数；只包含实际出现的字段，缺失字段读取为空串
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionParams(BTreeMap<String, String>);

impl ActionParams {
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ActionParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// 解析结果：动作类型（大写）与参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub action_type: String,
    pub params: ActionParams,
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

fn is_action_line(line: &str) -> bool {
    strip_prefix_ci(line.trim(), ACTION_KEYWORD).is_some()
}

/// 统计指令行数，用于检测一次回复多个动作
pub fn count_actions_in_response(text: &str) -> usize {
    text.lines().filter(|l| is_action_line(l)).count()
}

/// 第一个指令块：从首个 ACTION 行到下一个 ACTION 行之前；没有 ACTION 行时原样返回
pub fn first_action_block(text: &str) -> &str {
    let mut start = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_action_line(line) {
            match start {
                None => start = Some(offset),
                Some(s) => return &text[s..offset],
            }
        }
        offset += line.len();
    }
    match start {
        Some(s) => &text[s..],
        None => text,
    }
}

fn normalize_action_type(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace())
        .to_ascii_uppercase()
}

/// CONTENT 标记所在行的起始字节位置
fn content_marker_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if strip_prefix_ci(line.trim_start(), CONTENT_MARKER).is_some() {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn extract_content(text: &str, marker_line: usize) -> String {
    let line = &text[marker_line..];
    let indent = line.len() - line.trim_start().len();
    let mut rest = &text[marker_line + indent + CONTENT_MARKER.len()..];

    // 标记行其余部分为空时正文从下一行开始
    let first_line_end = rest.find('\n').unwrap_or(rest.len());
    if rest[..first_line_end].trim().is_empty() {
        rest = rest.get(first_line_end + 1..).unwrap_or("");
    } else {
        rest = rest.trim_start_matches([' ', '\t']);
    }

    // 跳过开头的 ```lang 行
    if rest.trim_start().starts_with(FENCE) {
        let trimmed = rest.trim_start();
        rest = match trimmed.find('\n') {
            Some(i) => &trimmed[i + 1..],
            None => "",
        };
    }

    let body = match rest.rfind(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim_end_matches(['\r', '\n']).to_string()
}

/// CONTENT 标记之后、最后一个围栏之后的文本；没有闭合围栏时为标记之后的全部文本
fn trailer_after_content(text: &str, marker_offset: usize) -> &str {
    let after = &text[marker_offset..];
    let after = after.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    match after.rfind(FENCE) {
        Some(end) => &after[end + FENCE.len()..],
        None => after,
    }
}

/// 解析一条指令；从不失败
pub fn parse_response(text: &str) -> ParsedAction {
    let action_type = text
        .lines()
        .find_map(|l| strip_prefix_ci(l.trim(), ACTION_KEYWORD))
        .map(normalize_action_type)
        .unwrap_or_default();

    let marker = content_marker_offset(text);
    let header = &text[..marker.unwrap_or(text.len())];
    let trailer = marker.map(|offset| trailer_after_content(text, offset));

    let mut params = ActionParams::default();
    for key in HEADER_FIELDS {
        let prefix = format!("{}:", key);
        let find = |section: &str| {
            section
                .lines()
                .find_map(|l| strip_prefix_ci(l.trim(), &prefix))
                .map(|v| v.trim().to_string())
        };
        // 头部优先；头部缺失时再看内容块之后的部分
        if let Some(value) = find(header).or_else(|| trailer.and_then(find)) {
            params.insert(key, value);
        }
    }
    if let Some(offset) = marker {
        params.insert(CONTENT, extract_content(text, offset));
    }

    ParsedAction {
        action_type,
        params,
    }
}

//! # Output Classifier / 输出分类器
//!
//! A single-pass, stateful line filter over the container's log stream.
//! The GLuaTest harness brackets the meaningful part of the server log
//! with start/end marker lines; everything outside that window is engine
//! noise. Two strategies implement the same contract:
//!
//! - [`MarkerClassifier`] — strict windows on exact start/end suffixes.
//! - [`PatternClassifier`] — ordered regex rules, including "always
//!   emit" rules that surface fatal startup errors printed outside any
//!   window.
//!
//! 对容器日志流进行单遍、有状态的行过滤。GLuaTest 测试框架用
//! 起止标记行包住服务器日志中有意义的部分；窗口之外皆为引擎噪音。
//! 两种策略实现同一契约。

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Stateful per-line classification. `classify` is called once per
/// complete line, in stream order, and answers whether the line is
/// emitted. Implementations own their window state; one instance serves
/// exactly one stream.
///
/// 有状态的逐行分类。`classify` 按流顺序对每个完整行调用一次，
/// 并回答该行是否输出。实现自行持有窗口状态；一个实例只服务一个流。
pub trait LineClassifier: Send {
    fn classify(&mut self, line: &str) -> bool;
}

/// Exact-marker strategy: suppressed until a line ends with the start
/// marker, passthrough until a line ends with the end marker. Marker
/// lines themselves are never emitted. Windows may repeat.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    start_marker: String,
    end_marker: String,
    passthrough: bool,
}

impl MarkerClassifier {
    pub fn new(start_marker: impl Into<String>, end_marker: impl Into<String>) -> Self {
        MarkerClassifier {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
            passthrough: false,
        }
    }
}

impl LineClassifier for MarkerClassifier {
    fn classify(&mut self, line: &str) -> bool {
        if self.passthrough {
            if line.ends_with(&self.end_marker) {
                self.passthrough = false;
                return false;
            }
            true
        } else {
            if line.ends_with(&self.start_marker) {
                self.passthrough = true;
            }
            false
        }
    }
}

/// What a matched [`FilterRule`] does with the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Emit the line regardless of window state; state is untouched.
    Emit,
    /// Open the passthrough window. The matching line is not emitted.
    Open,
    /// Close the passthrough window. The matching line is not emitted.
    Close,
}

#[derive(Debug, Clone)]
pub struct FilterRule {
    pub pattern: Regex,
    pub action: RuleAction,
}

impl FilterRule {
    pub fn new(pattern: Regex, action: RuleAction) -> Self {
        FilterRule { pattern, action }
    }
}

/// Multi-pattern strategy. Rules are evaluated in order and the first
/// applicable match wins; `Open` rules are skipped while the window is
/// open and `Close` rules while it is closed, so markers cannot
/// re-trigger inside their own window.
///
/// 多模式策略。规则按顺序求值，第一个适用的匹配生效；
/// 窗口开启时跳过 `Open` 规则，关闭时跳过 `Close` 规则，
/// 因此标记不会在自己的窗口内重复触发。
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    rules: Vec<FilterRule>,
    passthrough: bool,
}

impl PatternClassifier {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        PatternClassifier {
            rules,
            passthrough: false,
        }
    }

    /// A classifier that emits every line unchanged. Useful for replay
    /// checks and as the identity element of the contract.
    pub fn raw_passthrough() -> Self {
        PatternClassifier {
            rules: Vec::new(),
            passthrough: true,
        }
    }

    /// The built-in rule set for the GLuaTest harness: the test window
    /// is bracketed by the harness's start/complete lines, and two
    /// fatal startup messages are surfaced even outside the window.
    ///
    /// GLuaTest 测试框架的内置规则集：测试窗口由框架的开始/完成行
    /// 包住，两条致命启动消息即使在窗口外也会被输出。
    pub fn gluatest() -> Self {
        let rules = vec![
            FilterRule::new(
                Regex::new(r"Error loading gamemode!$").unwrap(),
                RuleAction::Emit,
            ),
            FilterRule::new(
                Regex::new(r": Server restart in 10 seconds").unwrap(),
                RuleAction::Emit,
            ),
            FilterRule::new(
                Regex::new(r"\[GLuaTest\]: Test run starting\.\.\.$").unwrap(),
                RuleAction::Open,
            ),
            FilterRule::new(
                Regex::new(r"\[GLuaTest\]: Test run complete!$").unwrap(),
                RuleAction::Close,
            ),
        ];
        PatternClassifier::new(rules)
    }
}

impl LineClassifier for PatternClassifier {
    fn classify(&mut self, line: &str) -> bool {
        let mut emit = self.passthrough;

        for rule in &self.rules {
            match rule.action {
                RuleAction::Open if self.passthrough => continue,
                RuleAction::Close if !self.passthrough => continue,
                _ => {}
            }
            if !rule.pattern.is_match(line) {
                continue;
            }

            match rule.action {
                RuleAction::Open => {
                    self.passthrough = true;
                    emit = false;
                }
                RuleAction::Close => {
                    self.passthrough = false;
                    emit = false;
                }
                RuleAction::Emit => emit = true,
            }
            break;
        }

        emit
    }
}

/// Pumps a byte stream through a classifier into a writer, line by line.
///
/// Lines are delimited by `\n`; a trailing `\r` is stripped before
/// classification so CRLF output from the Windows server build matches
/// the same rules. Kept lines are written with a single `\n` restored.
/// A final unterminated fragment is discarded: the harness guarantees
/// meaningful lines are terminator-delimited, so a partial line is
/// engine noise cut off mid-write.
///
/// 将字节流逐行经分类器泵入写入端。行以 `\n` 分隔；分类前去掉
/// 行尾 `\r`，使 Windows 服务器构建的 CRLF 输出匹配同一规则。
/// 保留的行恢复单个 `\n` 后写出。末尾未终止的片段被丢弃：
/// 框架保证有意义的行以终止符分隔，残行只是被截断的引擎噪音。
pub async fn copy_filtered<R, W>(
    reader: R,
    classifier: &mut dyn LineClassifier,
    writer: &mut W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Stream closed mid-line; the fragment is not a line.
            break;
        }

        let mut line = &buf[..buf.len() - 1];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        let text = String::from_utf8_lossy(line);
        if classifier.classify(&text) {
            writer.write_all(line).await?;
            writer.write_all(b"\n").await?;
        }
    }

    writer.flush().await?;
    Ok(())
}

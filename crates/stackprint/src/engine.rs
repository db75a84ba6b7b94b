//! Trace text in the dialects of the major JavaScript engines.
//!
//! The harness has no JavaScript engine underneath; these renderers stand in
//! for the host's native capture primitive and print a shadow stack the way
//! each engine prints `error.stack`.
//!
//! | engine         | frame line                    | async continuation  | header          |
//! |----------------|-------------------------------|---------------------|-----------------|
//! | V8             | `    at label (file:line:col)` | `    at async label` | `Error: message` |
//! | SpiderMonkey   | `label@file:line:col`         | `async*label@...`   | none            |
//! | JavaScriptCore | `label@file:line:col`         | not marked          | none            |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::StackTraceLimit;
use crate::frame::InvocationKind;
use crate::registry::{FunctionDecl, Owner};

/// A function on the shadow stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFrame<'a> {
    /// The running function
    pub function: &'a FunctionDecl,
    /// Resumed after a suspension rather than called directly
    pub resumed: bool,
}

impl<'a> ActiveFrame<'a> {
    pub fn new(function: &'a FunctionDecl) -> Self {
        Self {
            function,
            resumed: false,
        }
    }
}

/// Engine family whose trace format to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineDialect {
    /// Chrome, Node.js, Deno
    V8,
    /// Firefox
    SpiderMonkey,
    /// Safari, Bun
    #[serde(rename = "jsc")]
    JavaScriptCore,
}

impl EngineDialect {
    /// Every supported dialect
    pub const ALL: [EngineDialect; 3] = [
        EngineDialect::V8,
        EngineDialect::SpiderMonkey,
        EngineDialect::JavaScriptCore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EngineDialect::V8 => "v8",
            EngineDialect::SpiderMonkey => "spidermonkey",
            EngineDialect::JavaScriptCore => "jsc",
        }
    }

    /// Whether resumed async frames are distinguishable in this dialect's traces.
    pub fn marks_async_frames(self) -> bool {
        !matches!(self, EngineDialect::JavaScriptCore)
    }

    /// The label this engine prints for `function`.
    pub fn label(self, function: &FunctionDecl) -> String {
        let name = function.name.as_str();
        let owner = function.owner.as_ref();
        match self {
            EngineDialect::V8 => match (function.kind, owner) {
                (InvocationKind::Constructor, Some(owner)) => format!("new {}", owner.name()),
                (InvocationKind::Constructor, None) => format!("new {}", name),
                // the receiver of a static call is the class constructor
                (InvocationKind::ClassStaticMethod, _) => format!("Function.{}", name),
                (_, Some(Owner::Class(class))) => format!("{}.{}", class, name),
                (_, Some(Owner::Object(_))) => format!("Object.{}", name),
                (_, None) => name.to_string(),
            },
            EngineDialect::SpiderMonkey => match (function.kind, owner) {
                (InvocationKind::Constructor, Some(owner)) => owner.name().to_string(),
                (InvocationKind::PrototypeAssignedMethod, Some(Owner::Class(class))) => {
                    format!("{}.prototype.{}", class, name)
                }
                _ => name.to_string(),
            },
            EngineDialect::JavaScriptCore => match (function.kind, owner) {
                (InvocationKind::Constructor, Some(owner)) => owner.name().to_string(),
                _ => name.to_string(),
            },
        }
    }

    /// Render `error.stack` for an error thrown with `frames` active,
    /// innermost first. At most `limit` frames are printed.
    pub fn render(
        self,
        error_name: &str,
        message: &str,
        frames: &[ActiveFrame<'_>],
        limit: StackTraceLimit,
    ) -> String {
        let frames = &frames[..limit.cap(frames.len())];
        let mut lines = Vec::with_capacity(frames.len() + 1);

        match self {
            EngineDialect::V8 => {
                if message.is_empty() {
                    lines.push(error_name.to_string());
                } else {
                    lines.push(format!("{}: {}", error_name, message));
                }
                for frame in frames {
                    let label = self.label(frame.function);
                    let site = frame.function.site();
                    let prefix = if frame.resumed { "async " } else { "" };
                    if label.is_empty() {
                        lines.push(format!("    at {}{}", prefix, site));
                    } else {
                        lines.push(format!("    at {}{} ({})", prefix, label, site));
                    }
                }
                lines.join("\n")
            }
            EngineDialect::SpiderMonkey | EngineDialect::JavaScriptCore => {
                for frame in frames {
                    let prefix = if frame.resumed && self.marks_async_frames() {
                        "async*"
                    } else {
                        ""
                    };
                    lines.push(format!(
                        "{}{}@{}\n",
                        prefix,
                        self.label(frame.function),
                        frame.function.site()
                    ));
                }
                lines.concat()
            }
        }
    }
}

impl fmt::Display for EngineDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v8" | "node" | "chrome" => Ok(EngineDialect::V8),
            "spidermonkey" | "sm" | "firefox" => Ok(EngineDialect::SpiderMonkey),
            "jsc" | "javascriptcore" | "safari" => Ok(EngineDialect::JavaScriptCore),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

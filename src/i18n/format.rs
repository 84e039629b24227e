//! printf 风格的占位符插值
//!
//! 支持 `%s`、`%d`、`%%` 以及位置参数 `%1$s`。缺少参数、悬空的 `%`
//! 或未知的转换符都会返回 `TranslationError::Format`；多余的参数被忽略。

use crate::errors::TranslationError;
use std::fmt;

/// 翻译参数
#[derive(Debug, Clone, PartialEq)]
pub enum TransArg {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for TransArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransArg::Str(s) => f.write_str(s),
            TransArg::Int(i) => write!(f, "{}", i),
            TransArg::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for TransArg {
    fn from(value: &str) -> Self {
        TransArg::Str(value.to_string())
    }
}

impl From<String> for TransArg {
    fn from(value: String) -> Self {
        TransArg::Str(value)
    }
}

impl From<&String> for TransArg {
    fn from(value: &String) -> Self {
        TransArg::Str(value.clone())
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(impl From<$ty> for TransArg {
            fn from(value: $ty) -> Self {
                TransArg::Int(i64::from(value))
            }
        })*
    };
}

int_arg!(i32, i64, u32);

// 超出 i64 的无符号值按十进制文本保存
macro_rules! wide_int_arg {
    ($($ty:ty),*) => {
        $(impl From<$ty> for TransArg {
            fn from(value: $ty) -> Self {
                i64::try_from(value)
                    .map(TransArg::Int)
                    .unwrap_or_else(|_| TransArg::Str(value.to_string()))
            }
        })*
    };
}

wide_int_arg!(u64, usize);

impl From<f64> for TransArg {
    fn from(value: f64) -> Self {
        TransArg::Float(value)
    }
}

impl TransArg {
    /// `%d` 的十进制文本
    fn as_integer(&self) -> Option<String> {
        match self {
            TransArg::Int(i) => Some(i.to_string()),
            TransArg::Float(x) => Some((x.trunc() as i64).to_string()),
            TransArg::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(|i| i.to_string())
                    .or_else(|_| s.parse::<u64>().map(|u| u.to_string()))
                    .ok()
            }
        }
    }
}

/// 按占位符插值
pub fn interpolate(template: &str, args: &[TransArg]) -> Result<String, TranslationError> {
    let error = |reason: String| TranslationError::Format {
        template: template.to_string(),
        reason,
    };

    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        let position = if digits.is_empty() {
            None
        } else if chars.next_if_eq(&'$').is_some() {
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Some(n - 1),
                _ => return Err(error(format!("invalid argument position '{}'", digits))),
            }
        } else {
            return Err(error(format!("expected '$' after '%{}'", digits)));
        };

        let conversion = chars
            .next()
            .ok_or_else(|| error("dangling '%' at end of template".to_string()))?;
        if conversion == '%' && position.is_none() {
            output.push('%');
            continue;
        }

        let index = position.unwrap_or_else(|| {
            let index = next_arg;
            next_arg += 1;
            index
        });
        let arg = args
            .get(index)
            .ok_or_else(|| error(format!("missing argument {}", index + 1)))?;

        match conversion {
            's' => output.push_str(&arg.to_string()),
            'd' => {
                let value = arg
                    .as_integer()
                    .ok_or_else(|| error(format!("argument {} is not a number", index + 1)))?;
                output.push_str(&value);
            }
            other => return Err(error(format!("unknown conversion '%{}'", other))),
        }
    }

    Ok(output)
}

//! 模板渲染
//!
//! 完整的模板引擎不在本项目范围内。默认渲染器支持 `{{ dotted.key }}`
//! 变量替换（默认 HTML 转义，`{{ key|raw }}` 原样输出），
//! 数据覆盖全局变量，`@public/` 前缀的模板名从公共目录读取。
//! 惰性全局变量在模板引用到它时才求值，每次渲染重新求值。

use crate::domain::Renderer;
use crate::errors::RenderError;
use crate::utils::merge_recursive;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

pub const PUBLIC_NAMESPACE: &str = "@public/";

type LazyGlobal = Box<dyn Fn() -> Result<Value, RenderError> + Send + Sync>;

pub struct TemplateRenderer {
    template_root: PathBuf,
    public_root: PathBuf,
    globals: Map<String, Value>,
    lazy_globals: Vec<(String, LazyGlobal)>,
    cache_path: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(template_root: PathBuf, public_root: PathBuf) -> Self {
        Self {
            template_root,
            public_root,
            globals: Map::new(),
            lazy_globals: Vec::new(),
            cache_path: None,
        }
    }

    /// 全局变量，在每次渲染时可被数据覆盖
    pub fn add_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn add_lazy_global<F>(&mut self, name: &str, value: F)
    where
        F: Fn() -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.lazy_globals.push((name.to_string(), Box::new(value)));
    }

    /// 记录模板缓存目录（当前实现不编译模板）
    pub fn with_cache(mut self, cache_path: Option<PathBuf>) -> Self {
        self.cache_path = cache_path;
        self
    }

    pub fn cache_path(&self) -> Option<&PathBuf> {
        self.cache_path.as_ref()
    }

    fn template_path(&self, name: &str) -> PathBuf {
        match name.strip_prefix(PUBLIC_NAMESPACE) {
            Some(rest) => self.public_root.join(rest),
            None => self.template_root.join(name),
        }
    }

    fn load(&self, name: &str) -> Result<String, RenderError> {
        let path = self.template_path(name);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenderError::TemplateNotFound(name.to_string()),
            _ => RenderError::Read(name.to_string(), e),
        })
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        let source = self.load(name)?;
        let mut globals = self.globals.clone();
        for (global, value) in &self.lazy_globals {
            if source.contains(global.as_str()) {
                globals.insert(global.clone(), value()?);
            }
        }
        let mut context = Value::Object(globals);
        merge_recursive(&mut context, data.clone());
        substitute(name, &source, &context)
    }
}

fn substitute(name: &str, source: &str, context: &Value) -> Result<String, RenderError> {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| RenderError::Syntax(name.to_string()))?;

        let expression = after[..end].trim();
        let (path, raw) = match expression.strip_suffix("|raw") {
            Some(path) => (path.trim(), true),
            None => (expression, false),
        };
        let text = lookup(context, path).map(stringify).unwrap_or_default();
        if raw {
            output.push_str(&text);
        } else {
            output.push_str(&escape_html(&text));
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(context, |value, key| value.as_object()?.get(key))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

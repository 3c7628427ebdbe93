use crate::debounce_from_js;
use crate::host::{describe, WebHost};
use crate::logging;
use domwatch::{WatchOptions, Watcher};
use domwatch_core::{DomwatchError, Value};
use js_sys::{Array, Function, Reflect};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{warn, Level};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

fn console_emit(level: Level, line: &str) {
    let method = match level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        _ => "log",
    };
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(method) = Reflect::get(&console, &method.into()) else {
        return;
    };
    let Ok(method) = method.dyn_into::<Function>() else {
        return;
    };
    let _ = method.call1(&console, &JsValue::from_str(line));
}

fn install_console_logging() {
    // Repeated calls keep the first subscriber.
    logging::install(console_emit, Level::WARN);
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_console_logging();
}

/// JS-facing watcher: `new DomWatch({ callback, targets, debounceMs })`
#[wasm_bindgen]
pub struct DomWatch {
    inner: Watcher<WebHost>,
}

#[wasm_bindgen]
impl DomWatch {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<DomWatch, JsValue> {
        install_console_logging();

        let callback = to_value(&field(&options, "callback"));
        let targets = string_list(&field(&options, "targets"));
        let debounce = debounce_from_js(field(&options, "debounceMs").as_f64());

        let host = Rc::new(WebHost::new());
        let options = WatchOptions::new(callback)
            .targets(targets)
            .debounce(debounce);
        let inner = Watcher::new(host, options).map_err(to_js)?;
        Ok(DomWatch { inner })
    }

    pub fn start(&mut self) {
        self.inner.start();
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }

    #[wasm_bindgen(getter)]
    pub fn supported(&self) -> bool {
        self.inner.is_supported()
    }
}

fn field(object: &JsValue, name: &str) -> JsValue {
    if !object.is_object() {
        return JsValue::UNDEFINED;
    }
    Reflect::get(object, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

fn string_list(value: &JsValue) -> Vec<String> {
    if !Array::is_array(value) {
        return Vec::new();
    }
    Array::from(value)
        .iter()
        .filter_map(|item| item.as_string())
        .collect()
}

fn to_value(js: &JsValue) -> Value {
    if js.is_undefined() {
        return Value::Undefined;
    }
    if js.is_null() {
        return Value::Null;
    }
    if let Some(b) = js.as_bool() {
        return Value::Bool(b);
    }
    if let Some(n) = js.as_f64() {
        return Value::Number(n);
    }
    if let Some(s) = js.as_string() {
        return Value::String(s);
    }
    if let Some(function) = js.dyn_ref::<Function>() {
        let function = function.clone();
        return Value::function(move || {
            if let Err(e) = function.call0(&JsValue::NULL) {
                warn!("Watch callback threw: {}", describe(&e));
            }
        });
    }
    if Array::is_array(js) {
        return Value::Array(Array::from(js).iter().map(|v| to_value(&v)).collect());
    }
    // Plain objects only need their kind for validation.
    Value::Object(BTreeMap::new())
}

fn to_js(err: DomwatchError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

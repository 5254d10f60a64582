//! # Script Host
//!
//! Runs plugin source text in an embedded `rhai` engine with no ambient
//! capabilities. Module imports resolve to nothing, `eval` is disabled and
//! `print`/`debug` go to `tracing`. The only host function is a no-op
//! `require(name)`.
//!
//! A plugin exports its surface either by filling the pre-seeded `exports`
//! map or by evaluating to a map:
//!
//! ```text
//! exports.id = "kw";
//! exports.name = "Kuwo";
//! exports.getMusicUrl = |track, quality| {
//!     #{ url: "https://cdn.example.com/" + track.id, "type": quality }
//! };
//! ```
//!
//! A top-level `fn getMusicUrl(track, quality)` is used when the export map
//! has no `getMusicUrl` entry.

use async_trait::async_trait;
use core_runtime::config::ScriptConfig;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, Scope, AST, INT};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::model::{MusicUrl, Quality, Track};
use crate::plugin::{MusicUrlResolver, PluginInfo, PluginOrigin, SourcePlugin};

const EXPORTS: &str = "exports";
const RESOLVE_FN: &str = "getMusicUrl";

/// Compiles and evaluates plugin scripts.
#[derive(Clone)]
pub struct ScriptHost {
    engine: Arc<Engine>,
    rate_limit_message: String,
}

impl ScriptHost {
    pub fn new(limits: &ScriptConfig, rate_limit_message: impl Into<String>) -> Self {
        Self {
            engine: Arc::new(build_engine(limits)),
            rate_limit_message: rate_limit_message.into(),
        }
    }

    /// Executes `source` and builds a plugin from its exports.
    pub fn load(&self, source: &str, origin: &PluginOrigin) -> Result<SourcePlugin> {
        let load_error = |reason: String| SourceError::PluginLoad {
            origin: origin.to_string(),
            reason,
        };

        let ast = self
            .engine
            .compile(source)
            .map_err(|e| load_error(format!("syntax error: {}", e)))?;

        let mut scope = Scope::new();
        scope.push(EXPORTS, Map::new());

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| load_error(format!("script failed: {}", e)))?;

        let exports = match value.try_cast::<Map>() {
            Some(map) => map,
            None => scope
                .get_value::<Map>(EXPORTS)
                .ok_or_else(|| load_error("`exports` is no longer a map".to_string()))?,
        };

        let id = match exports.get("id") {
            Some(value) if value.is_string() => value.clone().into_string().unwrap_or_default(),
            Some(value) => {
                return Err(load_error(format!(
                    "`id` must be a string, found {}",
                    value.type_name()
                )))
            }
            None => return Err(load_error("missing `id` export".to_string())),
        };
        if id.trim().is_empty() {
            return Err(load_error("`id` export is empty".to_string()));
        }

        let text_field = |name: &str| -> Result<String> {
            match exports.get(name) {
                None => Ok(String::new()),
                Some(value) if value.is_unit() => Ok(String::new()),
                Some(value) if value.is_string() => {
                    Ok(value.clone().into_string().unwrap_or_default())
                }
                Some(value) => Err(load_error(format!(
                    "`{}` must be a string, found {}",
                    name,
                    value.type_name()
                ))),
            }
        };

        let mut src_url = text_field("srcUrl")?;
        if src_url.is_empty() {
            src_url = origin.src_url().unwrap_or_default().to_string();
        }

        let info = PluginInfo {
            id,
            name: text_field("name")?,
            author: text_field("author")?,
            version: text_field("version")?,
            src_url,
        };

        let function = match exports.get(RESOLVE_FN) {
            Some(value) if value.is_unit() => None,
            Some(value) => Some(value.clone().try_cast::<FnPtr>().ok_or_else(|| {
                load_error(format!(
                    "`{}` must be a function, found {}",
                    RESOLVE_FN,
                    value.type_name()
                ))
            })?),
            None if defines_resolver(&ast) => Some(
                FnPtr::new(RESOLVE_FN).map_err(|e| load_error(e.to_string()))?,
            ),
            None => None,
        };

        let resolver = function.map(|function| {
            Arc::new(ScriptResolver {
                plugin_id: info.id.clone(),
                engine: self.engine.clone(),
                ast: Arc::new(ast.clone()),
                function,
                rate_limit_message: self.rate_limit_message.clone(),
            }) as Arc<dyn MusicUrlResolver>
        });

        debug!(
            plugin_id = %info.id,
            origin = %origin,
            can_resolve = resolver.is_some(),
            "Evaluated plugin script"
        );

        Ok(SourcePlugin::new(info, source, resolver))
    }
}

fn build_engine(limits: &ScriptConfig) -> Engine {
    let mut engine = Engine::new();

    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);

    engine.on_print(|text| info!(target: "core_source::plugin", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "core_source::plugin", source = source.unwrap_or(""), %pos, "{}", text)
    });

    engine.register_fn("require", |_name: ImmutableString| ());

    engine
}

fn defines_resolver(ast: &AST) -> bool {
    ast.iter_functions()
        .any(|f| f.name == RESOLVE_FN && f.params.len() == 2)
}

/// Calls a plugin's exported `getMusicUrl`.
#[derive(Clone)]
pub struct ScriptResolver {
    plugin_id: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    function: FnPtr,
    rate_limit_message: String,
}

impl ScriptResolver {
    fn call(
        &self,
        track: Map,
        platform: String,
        track_id: String,
        quality: Quality,
    ) -> Result<MusicUrl> {
        let reply = self
            .function
            .call::<Dynamic>(&self.engine, &self.ast, (track, quality.as_str().to_string()))
            .map_err(|err| self.classify(&err, &platform, &track_id))?;

        parse_reply(reply, quality).map_err(|reason| SourceError::ResolveFailed {
            platform,
            track_id,
            reason,
        })
    }

    fn classify(&self, err: &EvalAltResult, platform: &str, track_id: &str) -> SourceError {
        if let Some(message) = thrown_message(err) {
            if message.trim().eq_ignore_ascii_case(self.rate_limit_message.trim()) {
                return SourceError::RateLimited {
                    platform: platform.to_string(),
                    message,
                };
            }
        }

        SourceError::ResolveFailed {
            platform: platform.to_string(),
            track_id: track_id.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl MusicUrlResolver for ScriptResolver {
    async fn get_music_url(&self, track: &Track, quality: Quality) -> Result<MusicUrl> {
        let this = self.clone();
        let map = track_to_map(track);
        let platform = track.platform.clone();
        let track_id = track.id.clone();

        debug!(plugin_id = %self.plugin_id, track_id = %track_id, %quality, "Calling plugin");

        tokio::task::spawn_blocking(move || this.call(map, platform, track_id, quality))
            .await
            .map_err(|e| SourceError::Internal(format!("plugin call panicked: {}", e)))?
    }
}

/// Value passed to `throw`, unwrapped from nested function-call errors.
/// A thrown map contributes its `message` field.
fn thrown_message(err: &EvalAltResult) -> Option<String> {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => {
            if let Some(map) = value.clone().try_cast::<Map>() {
                return map.get("message").map(|m| m.to_string());
            }
            Some(value.to_string())
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => thrown_message(inner),
        _ => None,
    }
}

fn track_to_map(track: &Track) -> Map {
    let optional = |value: Option<Dynamic>| value.unwrap_or(Dynamic::UNIT);

    let mut qualities = Map::new();
    for quality in Quality::ALL {
        qualities.insert(
            quality.as_str().into(),
            Dynamic::from(track.qualities.supports(quality)),
        );
    }

    let mut map = Map::new();
    map.insert("platform".into(), Dynamic::from(track.platform.clone()));
    map.insert("source".into(), Dynamic::from(track.platform.clone()));
    map.insert("id".into(), Dynamic::from(track.id.clone()));
    map.insert("title".into(), Dynamic::from(track.title.clone()));
    map.insert("artist".into(), Dynamic::from(track.artist.clone()));
    map.insert("album".into(), Dynamic::from(track.album.clone()));
    map.insert(
        "artwork".into(),
        optional(track.artwork.clone().map(Dynamic::from)),
    );
    map.insert(
        "duration".into(),
        optional(
            track
                .duration
                .and_then(|d| INT::try_from(d).ok())
                .map(Dynamic::from),
        ),
    );
    map.insert("qualities".into(), Dynamic::from_map(qualities));
    map
}

/// Accepts `#{ url, type }` (or `quality`), or a bare URL string.
fn parse_reply(reply: Dynamic, requested: Quality) -> std::result::Result<MusicUrl, String> {
    if reply.is_string() {
        let url = reply.into_string().unwrap_or_default();
        return non_empty_url(url).map(|url| MusicUrl {
            url,
            quality: requested,
        });
    }

    let type_name = reply.type_name();
    let map = reply
        .try_cast::<Map>()
        .ok_or_else(|| format!("expected a map reply, found {}", type_name))?;

    let url = match map.get("url") {
        Some(url) if url.is_string() => url.clone().into_string().unwrap_or_default(),
        _ => return Err("reply has no `url` string".to_string()),
    };
    let url = non_empty_url(url)?;

    let quality = match map.get("type").or_else(|| map.get("quality")) {
        None => requested,
        Some(value) if value.is_unit() => requested,
        Some(value) => {
            let name = value.to_string();
            Quality::from_name(&name).ok_or_else(|| format!("unknown quality `{}`", name))?
        }
    };

    Ok(MusicUrl { url, quality })
}

fn non_empty_url(url: String) -> std::result::Result<String, String> {
    if url.trim().is_empty() {
        Err("reply `url` is empty".to_string())
    } else {
        Ok(url)
    }
}

//! # galaconfig - Configuration de Gala
//!
//! Un seul fichier YAML, `<config_dir>/config.yaml`, fusionné avec la
//! configuration par défaut intégrée au binaire (`gala.yaml`) :
//!
//! - les clés sont insensibles à la casse (tout est ramené en minuscules)
//! - `GALA_CONFIG__SECTION__CLE=valeur` surcharge n'importe quelle clé
//! - le résultat fusionné est réécrit sur disque au chargement
//! - les accesseurs typés retombent sur une valeur par défaut si la valeur
//!   est invalide
//!
//! ```no_run
//! use galaconfig::get_config;
//!
//! let config = get_config();
//!
//! let port = config.get_http_port();
//! let delay = config.get_retry_delay_ms()?;
//!
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("gala.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Gala configuration"));
}

const ENV_CONFIG_DIR: &str = "GALA_CONFIG";
const ENV_PREFIX: &str = "GALA_CONFIG__";
const CONFIG_DIR_NAME: &str = ".gala";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_PUBLIC_DIR: &str = "public";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

const DEFAULT_MAX_FAILURES: usize = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_UNMUTE_DELAY_MS: u64 = 500;
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RESTRICTED_SIGNATURES: &[&str] =
    &["SMART-TV", "Samsung", "Tizen", "Web0S", "webOS", "HbbTV"];

const DEFAULT_COUNTDOWN_SECONDS: u64 = 10;
const DEFAULT_MUSIC_SRC: &str = "/music/background.mp3";
const DEFAULT_MUSIC_VOLUME: f64 = 0.3;
const DEFAULT_COUNTDOWN_AUDIO_SRC: &str = "/music/countdown-10-to-0.wav";
const DEFAULT_REVEAL_VIDEO_SRC: &str = "/video/reveal.mp4";

const DEFAULT_GALLERY_DIR: &str = "public/images";
const DEFAULT_GALLERY_FOLDERS: &[&str] = &["hero", "couple"];

/// Conversion entre un scalaire Rust et un noeud YAML
///
/// Les nombres écrits entre guillemets (typiquement via une variable
/// d'environnement) sont acceptés.
trait YamlScalar: Sized {
    fn from_yaml(value: &Value) -> Option<Self>;
    fn into_yaml(self) -> Value;
}

impl YamlScalar for u64 {
    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_yaml(self) -> Value {
        Value::Number(Number::from(self))
    }
}

impl YamlScalar for usize {
    fn from_yaml(value: &Value) -> Option<Self> {
        u64::from_yaml(value).and_then(|v| usize::try_from(v).ok())
    }

    fn into_yaml(self) -> Value {
        Value::Number(Number::from(self as u64))
    }
}

impl YamlScalar for u16 {
    fn from_yaml(value: &Value) -> Option<Self> {
        u64::from_yaml(value).and_then(|v| u16::try_from(v).ok())
    }

    fn into_yaml(self) -> Value {
        Value::Number(Number::from(self))
    }
}

impl YamlScalar for bool {
    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_yaml(self) -> Value {
        Value::Bool(self)
    }
}

impl YamlScalar for String {
    fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn into_yaml(self) -> Value {
        Value::String(self)
    }
}

/// Getter/setter pour une clé scalaire
///
/// Le getter échoue seulement si la clé est absente de l'arbre ; une valeur
/// du mauvais type donne la valeur par défaut.
macro_rules! impl_scalar_config {
    ($getter:ident, $setter:ident, $ty:ty, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<$ty> {
            self.get_scalar($path, $default)
        }

        pub fn $setter(&self, value: $ty) -> Result<()> {
            self.set_value($path, value.into_yaml())
        }
    };
}

/// Getter/setter pour une chaîne : le getter ne peut pas échouer
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            self.get_scalar($path, $default.to_string())
                .unwrap_or_else(|_| $default.to_string())
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration de Gala
///
/// L'arbre YAML est protégé par un `Mutex` ; chaque setter réécrit le
/// fichier.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.lock_data().clone()),
        }
    }
}

impl Config {
    /// Argument, puis `$GALA_CONFIG`, puis `./.gala`, puis `~/.gala`
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory from environment");
            return from_env;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .filter(|dir| dir.exists())
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_else(|| CONFIG_DIR_NAME.to_string())
    }

    /// Crée le répertoire si besoin et vérifie qu'on peut y écrire
    fn ensure_writable_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }

        let probe = dir.join(".write_test");
        fs::write(&probe, b"gala")?;
        fs::remove_file(&probe)?;
        Ok(())
    }

    /// Répertoire de configuration effectif, créé et vérifié
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir = Self::find_config_dir(directory);
        Self::ensure_writable_dir(Path::new(&dir))?;
        Ok(dir)
    }

    /// Charge `config.yaml` depuis `directory` (vide = recherche habituelle)
    ///
    /// Défauts intégrés, puis fichier utilisateur, puis variables
    /// d'environnement. Le résultat est réécrit sur disque.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        let path = Path::new(&config_dir)
            .join(CONFIG_FILE_NAME)
            .to_string_lossy()
            .to_string();
        info!(config_dir = %config_dir, "Using config directory");

        let mut tree: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => {
                let user: Value = serde_yaml::from_str(&text)?;
                merge_yaml(&mut tree, &lowercase_keys(user));
                info!(config_file = %path, "Loaded config file");
            }
            Ok(_) => info!(config_file = %path, "Empty config file, using defaults"),
            Err(_) => info!(config_file = %path, "No config file, using defaults"),
        }

        let mut tree = lowercase_keys(tree);
        apply_env_overrides(&mut tree);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(tree),
        };
        config.save()?;
        Ok(config)
    }

    fn lock_data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Répertoire contenant `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.lock_data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Écrit `value` sous `path` (ex: `&["host", "http_port"]`) puis sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        insert_at(&mut self.lock_data(), path, value)?;
        self.save()
    }

    /// Lit la valeur sous `path`. Erreur si la clé n'existe pas.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        lookup(&self.lock_data(), path).cloned()
    }

    fn get_scalar<T: YamlScalar>(&self, path: &[&str], default: T) -> Result<T> {
        let value = self.get_value(path)?;
        Ok(T::from_yaml(&value).unwrap_or_else(|| {
            warn!(key = %path.join("."), value = ?value, "Invalid config value, using default");
            default
        }))
    }

    fn get_string_list(&self, path: &[&str], default: &[&str]) -> Vec<String> {
        match self.get_value(path) {
            Ok(Value::Sequence(items)) => items
                .iter()
                .filter_map(String::from_yaml)
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Chemin relatif au répertoire de configuration, sauf s'il est absolu
    pub fn resolve_path(&self, dir_path: &str) -> PathBuf {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    // ---- host --------------------------------------------------------------

    impl_string_config!(
        get_base_url,
        set_base_url,
        &["host", "base_url"],
        DEFAULT_BASE_URL
    );

    /// Port HTTP, 8080 si absent ou invalide
    pub fn get_http_port(&self) -> u16 {
        self.get_scalar(&["host", "http_port"], DEFAULT_HTTP_PORT)
            .unwrap_or(DEFAULT_HTTP_PORT)
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], port.into_yaml())
    }

    impl_string_config!(
        get_public_dir,
        set_public_dir,
        &["host", "public_dir"],
        DEFAULT_PUBLIC_DIR
    );

    impl_scalar_config!(
        get_log_cache_size,
        set_log_cache_size,
        usize,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_scalar_config!(
        get_log_enable_console,
        set_log_enable_console,
        bool,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_scalar_config!(
        get_log_min_level,
        set_log_min_level,
        String,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL.to_string()
    );

    // ---- playback ----------------------------------------------------------

    impl_scalar_config!(
        get_max_failures,
        set_max_failures,
        usize,
        &["playback", "max_failures"],
        DEFAULT_MAX_FAILURES
    );

    impl_scalar_config!(
        get_retry_delay_ms,
        set_retry_delay_ms,
        u64,
        &["playback", "retry_delay_ms"],
        DEFAULT_RETRY_DELAY_MS
    );

    impl_scalar_config!(
        get_unmute_delay_ms,
        set_unmute_delay_ms,
        u64,
        &["playback", "unmute_delay_ms"],
        DEFAULT_UNMUTE_DELAY_MS
    );

    impl_scalar_config!(
        get_readiness_timeout_secs,
        set_readiness_timeout_secs,
        u64,
        &["playback", "readiness_timeout_secs"],
        DEFAULT_READINESS_TIMEOUT_SECS
    );

    impl_scalar_config!(
        get_command_timeout_secs,
        set_command_timeout_secs,
        u64,
        &["playback", "command_timeout_secs"],
        DEFAULT_COMMAND_TIMEOUT_SECS
    );

    /// User-agent fragments identifying embedded-TV browsers
    pub fn get_restricted_signatures(&self) -> Vec<String> {
        self.get_string_list(
            &["playback", "restricted_signatures"],
            DEFAULT_RESTRICTED_SIGNATURES,
        )
    }

    // ---- page --------------------------------------------------------------

    impl_scalar_config!(
        get_countdown_seconds,
        set_countdown_seconds,
        u64,
        &["page", "countdown_seconds"],
        DEFAULT_COUNTDOWN_SECONDS
    );

    impl_string_config!(
        get_music_src,
        set_music_src,
        &["page", "music", "src"],
        DEFAULT_MUSIC_SRC
    );

    impl_string_config!(
        get_countdown_audio_src,
        set_countdown_audio_src,
        &["page", "countdown_audio", "src"],
        DEFAULT_COUNTDOWN_AUDIO_SRC
    );

    impl_string_config!(
        get_reveal_video_src,
        set_reveal_video_src,
        &["page", "reveal_video", "src"],
        DEFAULT_REVEAL_VIDEO_SRC
    );

    /// Volume of the background music, clamped to `[0, 1]`
    pub fn get_music_volume(&self) -> f64 {
        match self.get_value(&["page", "music", "volume"]) {
            Ok(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_MUSIC_VOLUME).clamp(0.0, 1.0),
            _ => DEFAULT_MUSIC_VOLUME,
        }
    }

    pub fn set_music_volume(&self, volume: f64) -> Result<()> {
        self.set_value(
            &["page", "music", "volume"],
            Value::Number(Number::from(volume.clamp(0.0, 1.0))),
        )
    }

    // ---- gallery -----------------------------------------------------------

    impl_string_config!(
        get_gallery_dir,
        set_gallery_dir,
        &["gallery", "directory"],
        DEFAULT_GALLERY_DIR
    );

    /// Folder names the image listing endpoint accepts
    pub fn get_gallery_folders(&self) -> Vec<String> {
        self.get_string_list(&["gallery", "folders"], DEFAULT_GALLERY_FOLDERS)
    }
}

/// Configuration globale, chargée au premier accès
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn lookup<'a>(tree: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter().enumerate().try_fold(tree, |node, (i, key)| {
        let Value::Mapping(map) = node else {
            return Err(anyhow!("{} is not a mapping", path[..i].join(".")));
        };
        map.get(key.to_lowercase())
            .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))
    })
}

fn insert_at(tree: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *tree = value;
        return Ok(());
    };

    let mut node = tree;
    for key in parents {
        let Value::Mapping(map) = node else {
            return Err(anyhow!("Cannot set {}: parent is not a mapping", path.join(".")));
        };
        node = map
            .entry(Value::String(key.to_lowercase()))
            .or_insert(Value::Mapping(Mapping::new()));
    }

    match node {
        Value::Mapping(map) => {
            map.insert(Value::String(last.to_lowercase()), value);
            Ok(())
        }
        _ => Err(anyhow!("Cannot set {}: parent is not a mapping", path.join("."))),
    }
}

/// `GALA_CONFIG__PLAYBACK__MAX_FAILURES=5` → `playback.max_failures: 5`
fn apply_env_overrides(tree: &mut Value) {
    for (name, raw) in env::vars() {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = key.split("__").collect();
        if let Err(err) = insert_at(tree, &path, env_value(&raw)) {
            warn!(env_var = %name, error = %err, "Ignoring config override");
        }
    }
}

/// Une valeur d'environnement est lue comme du YAML (nombres, booléens,
/// listes), sinon gardée telle quelle
fn env_value(raw: &str) -> Value {
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Fusionne `overlay` dans `base` : les mappings sont fusionnés clé par
/// clé, tout le reste est remplacé
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

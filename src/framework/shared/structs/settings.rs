/// 実行時の設定。`.env`から読み込まれる。<br />
/// Runtime settings, read from `.env`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Settings {
    pub validation: bool,
    pub fullscreen: bool,
    pub vsync: bool,
    pub overlay: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            validation: Self::read_flag("VALIDATION"),
            fullscreen: Self::read_flag("FULLSCREEN"),
            vsync: Self::read_flag("VSYNC"),
            overlay: Self::read_flag("OVERLAY"),
        }
    }

    fn read_flag(key: &str) -> bool {
        match dotenv::var(key) {
            Ok(value) => value.trim().parse::<bool>().unwrap_or_else(|_| {
                log::warn!("Invalid value for {}: {}. Falling back to false.", key, value);
                false
            }),
            Err(_) => false,
        }
    }
}

/// Build-time version override (`APP_VERSION`), otherwise the crate version.
const fn version_or_pkg(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

pub const VERSION: &str = version_or_pkg(option_env!("APP_VERSION"));

//! # D-Bus Client Module
//!
//! Client side of the wallpaper service. The CLI uses it to hand work to a
//! running daemon so the daemon's single-flight guard covers manual refreshes
//! too.
//!
//! ```ignore
//! let client = WallpaperClient::connect().await?;
//! println!("{}", client.refresh_wallpaper().await?);
//! ```

use zbus::{proxy, Connection};

use crate::service::SERVICE_NAME;

/// D-Bus proxy for the wallpaper service
#[proxy(
    interface = "io.github.photowall.Wallpaper1",
    default_service = "io.github.photowall.Wallpaper1",
    default_path = "/io/github/photowall/Wallpaper1"
)]
trait WallpaperService {
    async fn refresh_wallpaper(&self) -> zbus::Result<String>;

    async fn apply_photo(&self, id: &str, position: &str) -> zbus::Result<String>;

    async fn prepare_editor_source(&self, id: &str) -> zbus::Result<String>;

    async fn reload_config(&self) -> zbus::Result<()>;

    async fn get_status(&self) -> zbus::Result<(bool, String, String)>;
}

/// High-level client for the daemon's wallpaper service
pub struct WallpaperClient {
    proxy: WallpaperServiceProxy<'static>,
}

impl WallpaperClient {
    /// Returns an error if the daemon is not running
    pub async fn connect() -> zbus::Result<Self> {
        let connection = Connection::session().await?;
        let proxy = WallpaperServiceProxy::new(&connection).await?;
        Ok(Self { proxy })
    }

    pub async fn refresh_wallpaper(&self) -> zbus::Result<String> {
        self.proxy.refresh_wallpaper().await
    }

    pub async fn apply_photo(&self, id: &str, position: &str) -> zbus::Result<String> {
        self.proxy.apply_photo(id, position).await
    }

    pub async fn prepare_editor_source(&self, id: &str) -> zbus::Result<String> {
        self.proxy.prepare_editor_source(id).await
    }

    /// Ask the daemon to pick up an edited config file
    pub async fn reload_config(&self) -> zbus::Result<()> {
        self.proxy.reload_config().await
    }

    /// `(busy, stage, last status)` of the daemon's pipeline
    pub async fn get_status(&self) -> zbus::Result<(bool, String, String)> {
        self.proxy.get_status().await
    }
}

/// Check if the daemon is running and registered on D-Bus
pub async fn is_service_available() -> bool {
    if let Ok(connection) = Connection::session().await {
        connection
            .call_method(
                Some("org.freedesktop.DBus"),
                "/org/freedesktop/DBus",
                Some("org.freedesktop.DBus"),
                "NameHasOwner",
                &SERVICE_NAME,
            )
            .await
            .and_then(|reply| reply.body().deserialize::<bool>())
            .unwrap_or(false)
    } else {
        false
    }
}

//! Windows shell backend: `IDesktopWallpaper` per monitor, `SystemParametersInfoW` as fallback.

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows::core::{HSTRING, PWSTR};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_APARTMENTTHREADED,
};
use windows::Win32::UI::Shell::{
    DesktopWallpaper, IDesktopWallpaper, DESKTOP_WALLPAPER_POSITION, DWPOS_CENTER, DWPOS_FILL,
    DWPOS_FIT, DWPOS_SPAN, DWPOS_STRETCH, DWPOS_TILE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER,
};

use super::{DesktopBackend, Position, WallpaperError, WallpaperSession};

fn to_dwpos(position: Position) -> DESKTOP_WALLPAPER_POSITION {
    match position {
        Position::Center => DWPOS_CENTER,
        Position::Tile => DWPOS_TILE,
        Position::Stretch => DWPOS_STRETCH,
        Position::Fit => DWPOS_FIT,
        Position::Fill => DWPOS_FILL,
        Position::Span => DWPOS_SPAN,
    }
}

fn modern(err: windows::core::Error) -> WallpaperError {
    WallpaperError::Modern(err.to_string())
}

/// The Windows shell desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsDesktop;

/// Keeps COM initialized on this thread for the lifetime of a session.
struct ComApartment {
    initialized: bool,
}

impl ComApartment {
    fn enter() -> Self {
        // RPC_E_CHANGED_MODE means COM is already up in another mode; usable, but not ours to tear down.
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        Self { initialized: hr.is_ok() }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

/// A live `IDesktopWallpaper` instance. Field order releases the interface before COM.
pub struct ShellSession {
    wallpaper: IDesktopWallpaper,
    _apartment: ComApartment,
}

impl DesktopBackend for WindowsDesktop {
    type Session = ShellSession;

    fn open_session(&self) -> Result<ShellSession, WallpaperError> {
        let apartment = ComApartment::enter();
        let wallpaper: IDesktopWallpaper =
            unsafe { CoCreateInstance(&DesktopWallpaper, None, CLSCTX_ALL) }.map_err(modern)?;
        Ok(ShellSession {
            wallpaper,
            _apartment: apartment,
        })
    }

    fn set_legacy(&self, path: &Path) -> Result<(), WallpaperError> {
        let mut wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
        unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                Some(wide.as_mut_ptr() as *mut c_void),
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        }
        .map_err(|e| WallpaperError::Legacy(e.to_string()))
    }
}

impl WallpaperSession for ShellSession {
    fn set_position(&mut self, position: Position) -> Result<(), WallpaperError> {
        unsafe { self.wallpaper.SetPosition(to_dwpos(position)) }.map_err(modern)
    }

    fn monitor_ids(&mut self) -> Result<Vec<String>, WallpaperError> {
        let count = unsafe { self.wallpaper.GetMonitorDevicePathCount() }.map_err(modern)?;
        let mut ids = Vec::with_capacity(count as usize);

        for index in 0..count {
            let raw: PWSTR = unsafe { self.wallpaper.GetMonitorDevicePathAt(index) }.map_err(modern)?;
            let id = unsafe { raw.to_string() };
            unsafe { CoTaskMemFree(Some(raw.0 as *const c_void)) };
            ids.push(id.map_err(|e| WallpaperError::Modern(format!("monitor id is not UTF-16: {e}")))?);
        }

        Ok(ids)
    }

    fn set_monitor_wallpaper(&mut self, monitor: &str, path: &Path) -> Result<(), WallpaperError> {
        let monitor = HSTRING::from(monitor);
        let image = HSTRING::from(path.as_os_str());
        unsafe { self.wallpaper.SetWallpaper(&monitor, &image) }.map_err(modern)
    }
}

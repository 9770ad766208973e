use std::path::Path;

use crate::models::{CaptureRegion, WindowInfo};
use crate::sensors::{SensorError, WindowInspector};

/// Desktop window inspector backed by `active-win-pos-rs` for the focused
/// window and the native window list for everything visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopInspector;

impl DesktopInspector {
    pub fn new() -> Self {
        Self
    }
}

impl WindowInspector for DesktopInspector {
    fn active_window(&self) -> Result<Option<WindowInfo>, SensorError> {
        // The crate reports "no focused window" and "lookup failed" the same way.
        let Ok(window) = active_win_pos_rs::get_active_window() else {
            return Ok(None);
        };

        let process_name = file_name(&window.process_path);
        let process_path = Some(window.process_path.to_string_lossy().into_owned()).filter(|p| !p.is_empty());
        let bounds = CaptureRegion::new(
            window.position.x.round() as i32,
            window.position.y.round() as i32,
            window.position.width.max(0.0).round() as u32,
            window.position.height.max(0.0).round() as u32,
        );

        Ok(Some(WindowInfo {
            title: window.title,
            process_name,
            process_path,
            bounds,
            visible: true,
        }))
    }

    fn visible_windows(&self) -> Result<Vec<WindowInfo>, SensorError> {
        native::visible_windows()
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

#[cfg(target_os = "windows")]
mod native {
    use winapi::shared::minwindef::{BOOL, LPARAM};
    use winapi::shared::windef::{HWND, RECT};
    use winapi::um::winuser::{EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowTextW, IsWindowVisible};

    use crate::models::{CaptureRegion, WindowInfo};
    use crate::sensors::SensorError;

    pub fn visible_windows() -> Result<Vec<WindowInfo>, SensorError> {
        let mut windows: Vec<WindowInfo> = Vec::new();

        unsafe {
            extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
                unsafe {
                    let windows = &mut *(lparam as *mut Vec<WindowInfo>);

                    if IsWindowVisible(hwnd) != 0 {
                        let len = GetWindowTextLengthW(hwnd);
                        if len > 0 {
                            let mut buf = vec![0u16; (len + 1) as usize];
                            let copied = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
                            if copied > 0 {
                                let title = String::from_utf16_lossy(&buf[..copied as usize]);
                                if !title.trim().is_empty() && title != "Program Manager" {
                                    let mut rect: RECT = std::mem::zeroed();
                                    let bounds = if GetWindowRect(hwnd, &mut rect) != 0 {
                                        CaptureRegion::new(
                                            rect.left,
                                            rect.top,
                                            (rect.right - rect.left).max(0) as u32,
                                            (rect.bottom - rect.top).max(0) as u32,
                                        )
                                    } else {
                                        CaptureRegion::new(0, 0, 0, 0)
                                    };

                                    let mut window = WindowInfo::titled(&title);
                                    window.bounds = bounds;
                                    windows.push(window);
                                }
                            }
                        }
                    }
                }
                1 // Continue enumeration
            }

            if EnumWindows(Some(enum_window_callback), &mut windows as *mut _ as LPARAM) == 0 {
                return Err(SensorError::Window("EnumWindows failed".to_string()));
            }
        }

        Ok(windows)
    }
}

#[cfg(not(target_os = "windows"))]
mod native {
    use crate::models::{CaptureRegion, WindowInfo};
    use crate::sensors::SensorError;

    pub fn visible_windows() -> Result<Vec<WindowInfo>, SensorError> {
        let windows = xcap::Window::all().map_err(|e| SensorError::Window(format!("Xcap window list: {}", e)))?;

        Ok(windows
            .into_iter()
            .filter(|w| !w.is_minimized() && !w.title().trim().is_empty())
            .map(|w| WindowInfo {
                title: w.title().to_string(),
                process_name: None,
                process_path: None,
                bounds: CaptureRegion::new(w.x(), w.y(), w.width(), w.height()),
                visible: true,
            })
            .collect())
    }
}

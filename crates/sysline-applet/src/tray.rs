//! System tray implementation using StatusNotifierItem (SNI).

use ksni::{menu::*, Handle, ToolTip, Tray, TrayService};
use std::path::{Path, PathBuf};
use sysline_core::{DisplayLine, DisplaySink, APP_ID};
use tokio::sync::mpsc;
use tracing::debug;

/// The sysline tray item. Its title carries the telemetry line.
pub struct SyslineTray {
    line: String,
    icon: Option<PathBuf>,
    quit_tx: mpsc::UnboundedSender<()>,
}

impl SyslineTray {
    pub fn new(icon: Option<PathBuf>, quit_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            line: String::new(),
            icon,
            quit_tx,
        }
    }

    fn quit(&self) {
        if let Err(e) = self.quit_tx.send(()) {
            debug!("Failed to send quit request: {}", e);
        }
    }
}

/// Splits an icon file into the (name, theme path) pair SNI hosts look up.
pub fn icon_lookup(icon: &Path) -> (String, String) {
    let name = icon
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = icon
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    (name, dir)
}

impl Tray for SyslineTray {
    fn id(&self) -> String {
        format!("{}-applet", APP_ID)
    }

    fn title(&self) -> String {
        self.line.clone()
    }

    /// Blank unless overridden, so only the text is visible.
    fn icon_name(&self) -> String {
        self.icon
            .as_deref()
            .map(|icon| icon_lookup(icon).0)
            .unwrap_or_default()
    }

    fn icon_theme_path(&self) -> String {
        self.icon
            .as_deref()
            .map(|icon| icon_lookup(icon).1)
            .unwrap_or_default()
    }

    fn tool_tip(&self) -> ToolTip {
        ToolTip {
            title: APP_ID.to_string(),
            description: self.line.clone(),
            ..Default::default()
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        vec![StandardItem {
            label: "Quit".to_string(),
            icon_name: "application-exit".to_string(),
            activate: Box::new(|tray: &mut Self| {
                tray.quit();
            }),
            ..Default::default()
        }
        .into()]
    }
}

/// Publishes lines by updating the running tray item.
pub struct TraySink {
    handle: Handle<SyslineTray>,
}

impl DisplaySink for TraySink {
    fn publish(&mut self, line: &DisplayLine) -> sysline_core::Result<()> {
        let text = line.to_string();
        self.handle.update(move |tray: &mut SyslineTray| tray.line = text);
        Ok(())
    }
}

/// Creates the tray service, its sink and the quit receiver.
pub fn create_tray(
    icon: Option<PathBuf>,
) -> (TrayService<SyslineTray>, TraySink, mpsc::UnboundedReceiver<()>) {
    let (quit_tx, quit_rx) = mpsc::unbounded_channel();
    let service = TrayService::new(SyslineTray::new(icon, quit_tx));
    let sink = TraySink {
        handle: service.handle(),
    };
    (service, sink, quit_rx)
}

fn main() {
    // The core library builds without a webview toolkit; only the desktop
    // shell needs Tauri's generated context.
    #[cfg(feature = "desktop")]
    tauri_build::build()
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

// 静态 FFmpeg (ez-ffmpeg "static") 在 Windows MSVC 下需要的系统库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // 标注视频编码 (H.264)
        println!("cargo:rustc-link-lib=dylib=libx264");

        // DirectShow 摄像头采集
        println!("cargo:rustc-link-lib=dylib=strmiids");
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // 网络协议 (TLS)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}

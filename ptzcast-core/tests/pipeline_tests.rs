//! Integration tests for the pipeline descriptor builder
//!
//! The builder is pure, so none of these spawn anything.

use ptzcast_core::config::{
    CaptureFormat, Encoder, OverlayBackground, OverlayKind, OverlayPosition, Protocol,
    StreamConfig,
};
use ptzcast_core::error::PtzError;
use ptzcast_core::pipeline::{RTMP_FALLBACK_URI, SRT_LATENCY_MS, build};
use std::path::Path;

const DEVICE: &str = "/dev/video0";

fn config(protocol: Protocol, destination: &str) -> StreamConfig {
    StreamConfig {
        protocol,
        destination: destination.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_build_is_deterministic() {
    let mut cfg = config(Protocol::Srt, "srt://10.0.0.2:9000");
    cfg.overlay.enabled = true;
    cfg.overlay.title = "Sunday Service".into();
    cfg.overlay.show_timestamp = true;

    let a = build(&cfg, Path::new(DEVICE)).unwrap();
    let b = build(&cfg, Path::new(DEVICE)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_args(), b.to_args());
}

#[test]
fn test_default_srt_pipeline_stage_order() {
    let desc = build(&config(Protocol::Srt, "srt://10.0.0.2:9000"), Path::new(DEVICE)).unwrap();
    assert_eq!(
        desc.names(),
        vec![
            "v4l2src",
            "image/jpeg",
            "jpegdec",
            "nvvidconv",
            "video/x-raw(memory:NVMM)",
            "nvv4l2h264enc",
            "video/x-h264",
            "h264parse",
            "mpegtsmux",
            "srtsink",
        ]
    );

    let source = desc.find("v4l2src").unwrap();
    assert_eq!(source.get("device"), Some(DEVICE));

    let sink = desc.sink().unwrap();
    assert_eq!(sink.get("uri"), Some("srt://10.0.0.2:9000"));
    assert_eq!(sink.get("latency"), Some(SRT_LATENCY_MS.to_string().as_str()));
}

#[test]
fn test_rtmp_empty_destination_uses_fallback() {
    let desc = build(&config(Protocol::Rtmp, ""), Path::new(DEVICE)).unwrap();
    let sink = desc.sink().unwrap();
    assert_eq!(sink.name, "rtmpsink");
    assert_eq!(sink.get("location"), Some(RTMP_FALLBACK_URI));

    let names = desc.names();
    let mux = names.iter().position(|n| *n == "flvmux").unwrap();
    assert_eq!(mux, names.len() - 2);
    assert_eq!(desc.find("flvmux").unwrap().get("streamable"), Some("true"));
}

#[test]
fn test_udp_destination_without_scheme() {
    let desc = build(&config(Protocol::Udp, "192.168.1.50:6000"), Path::new(DEVICE)).unwrap();
    let sink = desc.sink().unwrap();
    assert_eq!(sink.name, "udpsink");
    assert_eq!(sink.get("host"), Some("192.168.1.50"));
    assert_eq!(sink.get("port"), Some("6000"));
}

#[test]
fn test_udp_unparsable_destination_falls_back() {
    let desc = build(&config(Protocol::Udp, "udp://:notaport"), Path::new(DEVICE)).unwrap();
    let sink = desc.sink().unwrap();
    assert_eq!(sink.get("host"), Some("127.0.0.1"));
    assert_eq!(sink.get("port"), Some("5000"));
}

#[test]
fn test_unknown_protocol_fails_at_build_time() {
    let cfg = config(Protocol::from("webrtc".to_string()), "x");
    let err = build(&cfg, Path::new(DEVICE)).unwrap_err();
    assert!(matches!(err, PtzError::UnsupportedProtocol(p) if p == "webrtc"));
}

#[test]
fn test_unknown_encoder_fails_at_build_time() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.encoder = Encoder::from("vaapih264enc".to_string());
    assert!(matches!(
        build(&cfg, Path::new(DEVICE)),
        Err(PtzError::UnsupportedEncoder(_))
    ));
}

#[test]
fn test_overlay_stage_order() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;
    cfg.overlay.show_timestamp = true;
    cfg.overlay.title = "Title".into();
    cfg.overlay.subtitle = "Subtitle".into();
    cfg.overlay.logo_path = "/srv/logo.png".into();

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let names = desc.names();
    let start = names.iter().position(|n| *n == "jpegdec").unwrap() + 1;
    assert_eq!(
        &names[start..start + 5],
        &[
            "videoconvert",
            "clockoverlay",
            "textoverlay",
            "textoverlay",
            "gdkpixbufoverlay"
        ]
    );

    let logo = desc.find("gdkpixbufoverlay").unwrap();
    assert_eq!(logo.get("offset-x"), Some("20"));
    assert_eq!(logo.get("offset-y"), Some("20"));
}

#[test]
fn test_overlay_stages_are_conditional() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert!(desc.find("videoconvert").is_some());
    assert!(desc.find("clockoverlay").is_none());
    assert!(desc.find("textoverlay").is_none());
    assert!(desc.find("gdkpixbufoverlay").is_none());

    cfg.overlay.enabled = false;
    cfg.overlay.title = "ignored".into();
    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert!(desc.find("textoverlay").is_none());
}

#[test]
fn test_overlay_positions_and_background() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;
    cfg.overlay.show_timestamp = true;
    cfg.overlay.title = "Title".into();
    cfg.overlay.subtitle = "Sub".into();
    cfg.overlay.position = OverlayPosition::Bottom;
    cfg.overlay.color = "Yellow".into();
    cfg.overlay.background_opacity = 1.0;

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let clock = desc.find("clockoverlay").unwrap();
    assert_eq!(clock.get("valignment"), Some("bottom"));
    assert_eq!(clock.get("halignment"), Some("right"));
    assert_eq!(clock.get("shading-value"), Some("255"));

    let texts: Vec<_> = desc
        .stages()
        .iter()
        .filter(|s| s.name == "textoverlay")
        .collect();
    assert_eq!(texts[0].get("valignment"), Some("bottom"));
    assert_eq!(texts[0].get("color"), Some("0xFFFFFF00"));
    assert_eq!(texts[1].get("valignment"), Some("bottom"));
    assert_eq!(texts[1].get("font-desc"), Some("Sans 24"));

    cfg.overlay.position = OverlayPosition::Top;
    cfg.overlay.background = OverlayBackground::None;
    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let subtitle = desc
        .stages()
        .iter()
        .filter(|s| s.name == "textoverlay")
        .nth(1)
        .unwrap();
    assert_eq!(subtitle.get("valignment"), Some("center"));
    assert_eq!(subtitle.get("shaded-background"), Some("false"));
}

#[test]
fn test_url_overlay_uses_image_stage_only() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;
    cfg.overlay.kind = OverlayKind::Url;
    cfg.overlay.title = "not rendered".into();
    cfg.overlay.url = "/srv/lower-third.png".into();

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert!(desc.find("textoverlay").is_none());
    assert_eq!(
        desc.find("gdkpixbufoverlay").unwrap().get("location"),
        Some("/srv/lower-third.png")
    );
}

#[test]
fn test_yuyv_capture() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.capture_format = CaptureFormat::Yuyv;
    cfg.width = 1280;
    cfg.height = 720;

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let caps = &desc.stages()[1];
    assert_eq!(caps.name, "video/x-raw");
    assert_eq!(caps.get("format"), Some("YUY2"));
    assert_eq!(caps.get("width"), Some("1280"));
    assert_eq!(caps.get("framerate"), Some("30/1"));
    assert!(desc.find("jpegdec").is_none());
}

#[test]
fn test_encoder_variants() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");

    cfg.encoder = Encoder::X264enc;
    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let enc = desc.find("x264enc").unwrap();
    assert_eq!(enc.get("bitrate"), Some("5000"));
    assert_eq!(enc.get("tune"), Some("zerolatency"));
    assert!(desc.find("nvvidconv").is_none());

    cfg.encoder = Encoder::V4l2h264enc;
    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert!(
        desc.find("v4l2h264enc")
            .unwrap()
            .get("extra-controls")
            .unwrap()
            .contains("video_bitrate=5000000")
    );

    cfg.encoder = Encoder::Omxh264enc;
    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert_eq!(desc.find("omxh264enc").unwrap().get("bitrate"), Some("5000000"));
}

#[test]
fn test_launch_args_quote_text() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;
    cfg.overlay.title = "Main Hall".into();

    let args = build(&cfg, Path::new(DEVICE)).unwrap().to_args();
    assert!(args.contains(&"text=\"Main Hall\"".to_string()));
    assert_eq!(args[0], "v4l2src");
    assert_eq!(args[2], "!");
}

#[test]
fn test_center_position_keeps_title_at_top() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.overlay.enabled = true;
    cfg.overlay.title = "Title".into();
    cfg.overlay.subtitle = "Sub".into();
    cfg.overlay.position = OverlayPosition::Center;

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    let texts: Vec<_> = desc
        .stages()
        .iter()
        .filter(|s| s.name == "textoverlay")
        .collect();
    assert_eq!(texts[0].get("valignment"), Some("top"));
    assert_eq!(texts[1].get("valignment"), Some("center"));
}

#[test]
fn test_extreme_font_size_and_framerate() {
    let mut cfg = config(Protocol::Srt, "srt://x:1");
    cfg.framerate = u32::MAX;
    cfg.encoder = Encoder::X264enc;
    cfg.overlay.enabled = true;
    cfg.overlay.subtitle = "Sub".into();
    cfg.overlay.font_size = u32::MAX;

    let desc = build(&cfg, Path::new(DEVICE)).unwrap();
    assert_eq!(
        desc.find("textoverlay").unwrap().get("font-desc"),
        Some("Sans 3221225471")
    );
    assert_eq!(desc.find("x264enc").unwrap().get("key-int-max"), Some("8589934590"));
}

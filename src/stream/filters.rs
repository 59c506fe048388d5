//! # Filter vocabulary
//!
//! The ffmpeg filter expressions behind every stream operation. The graph
//! backend wires them into one `-filter_complex`; the clip backend runs them
//! one step at a time. Keeping them in one place is what makes the two
//! backends render the same thing.
//!
//! Values are escaped twice, as ffmpeg expects: once for the option parser
//! (`\`, `'`, `:`) and once for the filtergraph parser (`\`, `'`, `[`, `]`,
//! `,`, `;`).

use std::path::Path;

use crate::{
    stream::{
        layout::{centered_offset, scale_to_fit, TextLayout, BOX_OPACITY, TEXT_MARGIN},
        traits::{
            BoxEdge, Canvas, Fade, RenderSettings, StreamInfo, TextBox, TextMotion, TextPlacement,
        },
    },
    timing::Interval,
};

/// Kind of media carried by a pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Stream specifier suffix (`v`/`a`)
    pub fn specifier(self) -> &'static str {
        match self {
            MediaKind::Video => "v",
            MediaKind::Audio => "a",
        }
    }
}

/// Format seconds compactly: `10`, `2.5`, `0.125`
pub fn secs(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Escape a value for the option parser
pub fn escape_option_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a value for the filtergraph parser
pub fn escape_graph_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape free text (or a path) for use as a drawtext option
pub fn escape_text(text: &str) -> String {
    escape_graph_value(&escape_option_value(text))
}

/// Escape an expression (which may contain commas) for use as an option
fn expr(expression: &str) -> String {
    escape_graph_value(expression)
}

/// Font and box rendering details shared by every text filter
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_file: Option<String>,
    /// `t=` value for drawbox: `fill` on ffmpeg builds that know it, `max` otherwise
    pub box_thickness: &'static str,
}

impl TextStyle {
    pub fn new(font_file: Option<&Path>, supports_fill: bool) -> Self {
        Self {
            font_file: font_file.map(|path| path.display().to_string()),
            box_thickness: if supports_fill { "fill" } else { "max" },
        }
    }

    fn drawtext(&self, text: &str, font_size: u32) -> String {
        let mut filter = String::from("drawtext=");
        if let Some(font_file) = &self.font_file {
            filter.push_str(&format!("fontfile={}:", escape_text(font_file)));
        }
        filter.push_str(&format!(
            "expansion=none:text={}:fontcolor=white:fontsize={}",
            escape_text(text),
            font_size
        ));
        filter
    }
}

/// Normalize frame rate and sample aspect ratio of freshly opened video
pub fn video_format(settings: &RenderSettings) -> String {
    format!("fps={},format=yuv420p,setsar=1", settings.fps)
}

/// Normalize sample format, rate and layout of freshly opened audio
pub fn audio_format(settings: &RenderSettings) -> String {
    format!(
        "aformat=sample_fmts=fltp:sample_rates={}:channel_layouts=stereo",
        settings.sample_rate
    )
}

/// Black frames at canvas size
pub fn black_source(canvas: Canvas, settings: &RenderSettings, duration: f64) -> String {
    format!(
        "color=c=black:s={}x{}:r={}:d={},format=yuv420p,setsar=1",
        canvas.width,
        canvas.height,
        settings.fps,
        secs(duration)
    )
}

/// Silence in the common audio format
pub fn silence_source(settings: &RenderSettings, duration: f64) -> String {
    format!(
        "anullsrc=r={}:cl=stereo,atrim=duration={},{}",
        settings.sample_rate,
        secs(duration),
        audio_format(settings)
    )
}

/// A pure sine tone in the common audio format
pub fn sine_source(frequency_hz: f64, settings: &RenderSettings, duration: f64) -> String {
    format!(
        "sine=frequency={}:sample_rate={}:duration={},{}",
        secs(frequency_hz),
        settings.sample_rate,
        secs(duration),
        audio_format(settings)
    )
}

/// Trim to `interval` and restart timestamps at zero
pub fn trim(kind: MediaKind, interval: &Interval) -> String {
    match kind {
        MediaKind::Video => format!(
            "trim=start={}:end={},setpts=PTS-STARTPTS",
            secs(interval.start()),
            secs(interval.end())
        ),
        MediaKind::Audio => format!(
            "atrim=start={}:end={},asetpts=PTS-STARTPTS",
            secs(interval.start()),
            secs(interval.end())
        ),
    }
}

/// Audio before `end`
pub fn audio_head(end: f64) -> String {
    format!("atrim=end={},asetpts=PTS-STARTPTS", secs(end))
}

/// Audio from `start` onwards
pub fn audio_tail(start: f64) -> String {
    format!("atrim=start={},asetpts=PTS-STARTPTS", secs(start))
}

/// Fade filters for one media kind, `None` when the fade changes nothing
pub fn fade(kind: MediaKind, fade: &Fade) -> Option<String> {
    if fade.is_noop() {
        return None;
    }
    let name = match kind {
        MediaKind::Video => "fade",
        MediaKind::Audio => "afade",
    };
    let mut parts = Vec::new();
    if fade.fade_in {
        parts.push(format!("{}=t=in:st=0:d={}", name, secs(fade.duration)));
    }
    if fade.fade_out {
        parts.push(format!(
            "{}=t=out:st={}:d={}",
            name,
            secs(fade.fade_out_start()),
            secs(fade.duration)
        ));
    }
    Some(parts.join(","))
}

/// Aspect-preserving scale plus centered black padding, `None` if already canvas-sized
pub fn scale_and_pad(info: &StreamInfo, canvas: Canvas) -> Option<String> {
    if info.width == canvas.width && info.height == canvas.height {
        return None;
    }
    let (width, height) = scale_to_fit(info.width, info.height, canvas.width, canvas.height);
    let (x, y) = centered_offset(width, height, canvas.width, canvas.height);
    Some(format!(
        "scale={}:{},pad={}:{}:{}:{}:color=black,setsar=1",
        width, height, canvas.width, canvas.height, x, y
    ))
}

/// Horizontal position of scrolling text: enters at the right edge and
/// reaches the left margin exactly `length` seconds after `delay`
fn scroll_x(layout: &TextLayout, length: f64, delay: f64) -> String {
    let width = layout.frame_width;
    let travel = width.saturating_sub(TEXT_MARGIN);
    let elapsed = if delay > 0.0 {
        format!("(t-{})", secs(delay))
    } else {
        "t".to_string()
    };
    format!(
        "max({},{}-{}*{}/{})",
        TEXT_MARGIN,
        width,
        travel,
        elapsed,
        secs(length.max(f64::EPSILON))
    )
}

/// Vertical position centering text in a bar starting at `top`
fn text_y_in_box(layout: &TextLayout, top: u32) -> String {
    format!("{}+({}-text_h)/2", top, layout.box_height)
}

/// Semi-transparent bar with (optionally scrolling) text in it
pub fn text_in_box(
    text: &str,
    text_box: &TextBox,
    layout: &TextLayout,
    style: &TextStyle,
) -> String {
    let top = layout.box_top(text_box.edge == BoxEdge::Top);
    let delay = text_box.delay.unwrap_or(0.0);
    let bar = format!(
        "drawbox=x=0:y={}:w=iw:h={}:color=black@{}:t={}",
        top, layout.box_height, BOX_OPACITY, style.box_thickness
    );
    let x = match text_box.motion {
        TextMotion::Scroll => scroll_x(layout, text_box.length, delay),
        TextMotion::Static => TEXT_MARGIN.to_string(),
    };
    let mut label = format!(
        "{}:x={}:y={}",
        style.drawtext(text, layout.font_size),
        expr(&x),
        expr(&text_y_in_box(layout, top))
    );
    if delay > 0.0 {
        label.push_str(&format!(":enable={}", expr(&format!("gte(t,{})", secs(delay)))));
    }
    format!("{},{}", bar, label)
}

/// Scrolling bottom text without a bar, as used on spacer cards
pub fn spacer_text(text: &str, duration: f64, layout: &TextLayout, style: &TextStyle) -> String {
    let top = layout.box_top(false);
    format!(
        "{}:x={}:y={}",
        style.drawtext(text, layout.font_size),
        expr(&scroll_x(layout, duration, 0.0)),
        expr(&text_y_in_box(layout, top))
    )
}

/// Centered text at a height fraction, optionally fading in and out around an interval
pub fn placed_text(
    text: &str,
    placement: &TextPlacement,
    layout: &TextLayout,
    style: &TextStyle,
) -> String {
    let center = layout.line_center(placement.height_fraction);
    let mut filter = format!(
        "{}:x={}:y={}",
        style.drawtext(text, layout.font_size),
        expr("(w-text_w)/2"),
        expr(&format!("{}-text_h/2", center))
    );
    if let Some(interval) = placement.interval {
        let start = interval.start();
        let end = interval.end();
        let alpha = format!(
            "clip(if(lt(t,{s}),t-{s}+1,if(lt(t,{e}),1,{e}+1-t)),0,1)",
            s = secs(start),
            e = secs(end)
        );
        let enable = format!(
            "between(t,{},{})",
            secs((start - 1.0).max(0.0)),
            secs(end + 1.0)
        );
        filter.push_str(&format!(":alpha={}:enable={}", expr(&alpha), expr(&enable)));
    }
    filter
}

/// Concatenate `count` segments of one media kind
pub fn concat(kind: MediaKind, count: usize) -> String {
    match kind {
        MediaKind::Video => format!("concat=n={}:v=1:a=0", count),
        MediaKind::Audio => format!("concat=n={}:v=0:a=1", count),
    }
}

/// Crossfade two segments, the second starting `duration` before the first ends
pub fn crossfade(kind: MediaKind, duration: f64, first_duration: f64) -> String {
    match kind {
        MediaKind::Video => format!(
            "xfade=transition=fade:duration={}:offset={}",
            secs(duration),
            secs(first_duration - duration)
        ),
        MediaKind::Audio => format!("acrossfade=d={}:c1=tri:c2=tri", secs(duration)),
    }
}

/// Duplicate a pad
pub fn split(kind: MediaKind, count: usize) -> String {
    match kind {
        MediaKind::Video => format!("split={}", count),
        MediaKind::Audio => format!("asplit={}", count),
    }
}

/// Play backwards
pub fn reverse(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "reverse",
        MediaKind::Audio => "areverse",
    }
}

/// Discard a pad nobody consumes
pub fn null_sink(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "nullsink",
        MediaKind::Audio => "anullsink",
    }
}

/// EBU R128 loudness normalization, resampled back to the common format
pub fn loudness(settings: &RenderSettings) -> String {
    format!("loudnorm=I=-16:TP=-1.5:LRA=11,{}", audio_format(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::traits::Channels;

    fn style() -> TextStyle {
        TextStyle::new(None, true)
    }

    #[test]
    fn test_secs_formatting() {
        assert_eq!(secs(10.0), "10");
        assert_eq!(secs(2.5), "2.5");
        assert_eq!(secs(0.125), "0.125");
        assert_eq!(secs(0.0), "0");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(escape_text("It's 1:0, ok"), r"It\\\'s 1\\:0\, ok");
        assert_eq!(escape_text("[a;b]"), r"\[a\;b\]");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_trim_filters() {
        let interval = Interval::parse("0:05", "0:15").unwrap();
        assert_eq!(trim(MediaKind::Video, &interval), "trim=start=5:end=15,setpts=PTS-STARTPTS");
        assert_eq!(trim(MediaKind::Audio, &interval), "atrim=start=5:end=15,asetpts=PTS-STARTPTS");
    }

    #[test]
    fn test_fade_filters() {
        let both = Fade::symmetric(3.0, 10.0);
        assert_eq!(
            fade(MediaKind::Video, &both).unwrap(),
            "fade=t=in:st=0:d=3,fade=t=out:st=7:d=3"
        );

        let out_only = Fade { fade_in: false, ..both };
        assert_eq!(fade(MediaKind::Audio, &out_only).unwrap(), "afade=t=out:st=7:d=3");

        assert!(fade(MediaKind::Video, &Fade::symmetric(0.0, 10.0)).is_none());
    }

    #[test]
    fn test_scale_and_pad_letterboxes() {
        let info = StreamInfo::new(Channels::VideoOnly, 640, 480, 10.0);
        assert_eq!(
            scale_and_pad(&info, Canvas::new(1280, 720)).unwrap(),
            "scale=960:720,pad=1280:720:160:0:color=black,setsar=1"
        );

        let already = StreamInfo::new(Channels::VideoOnly, 1280, 720, 10.0);
        assert!(scale_and_pad(&already, Canvas::new(1280, 720)).is_none());
    }

    #[test]
    fn test_scrolling_box_reaches_margin_at_length() {
        let layout = TextLayout::for_frame(1280, 720);
        let filter = text_in_box("Question 1.2", &TextBox::scrolling(10.0), &layout, &style());
        assert!(filter.starts_with("drawbox=x=0:y=617:w=iw:h=103:color=black@0.6:t=fill,"));
        assert!(filter.contains(r"x=max(50\,1280-1230*t/10)"));
        assert!(filter.contains("fontsize=51"));
        assert!(filter.contains("y=617+(103-text_h)/2"));
    }

    #[test]
    fn test_static_banner_at_top() {
        let layout = TextLayout::for_frame(1280, 720);
        let filter = text_in_box("Artist - Title", &TextBox::banner(10.0), &layout, &style());
        assert!(filter.contains("drawbox=x=0:y=0:"));
        assert!(filter.contains("text=Artist - Title"));
        assert!(filter.contains(":x=50:"));
    }

    #[test]
    fn test_delayed_box_text() {
        let layout = TextLayout::for_frame(1280, 720);
        let filter = text_in_box("Late", &TextBox::scrolling(8.0).with_delay(2.0), &layout, &style());
        assert!(filter.contains(r"1230*(t-2)/8"));
        assert!(filter.contains(r"enable=gte(t\,2)"));
    }

    #[test]
    fn test_fading_text_window() {
        let layout = TextLayout::for_frame(1280, 720);
        let placement = TextPlacement::centered().during(Interval::new(3.0, 6.0).unwrap());
        let filter = placed_text("Label", &placement, &layout, &style());
        assert!(filter.contains("y=360-text_h/2"));
        assert!(filter.contains(r"enable=between(t\,2\,7)"));
        assert!(filter.contains(r"alpha=clip(if(lt(t\,3)\,t-3+1"));
    }

    #[test]
    fn test_crossfade_offset() {
        assert_eq!(
            crossfade(MediaKind::Video, 2.0, 10.0),
            "xfade=transition=fade:duration=2:offset=8"
        );
        assert_eq!(crossfade(MediaKind::Audio, 2.0, 10.0), "acrossfade=d=2:c1=tri:c2=tri");
    }

    #[test]
    fn test_box_thickness_fallback() {
        let old = TextStyle::new(None, false);
        let layout = TextLayout::for_frame(1280, 720);
        assert!(text_in_box("x", &TextBox::banner(1.0), &layout, &old).contains(":t=max,"));
    }
}

//! Minimal Office Open XML (`.pptx`) writer and reader.
//!
//! The writer emits one blank master/layout pair, one theme, and for every
//! slide a part with text boxes plus a notes part holding the narration.

use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{parse_hex_color, RenderError};
use crate::config::PresentationSettings;
use crate::models::{Presentation, Slide};

/// English Metric Units per pixel at 96 DPI.
pub const EMU_PER_PIXEL: i64 = 9525;

/// Shape name marking the title slide's heading; used to detect it on read.
const DECK_TITLE_SHAPE: &str = "Deck Title";

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_OFFICE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CLR_MAP: &str = r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#;

const EMPTY_TREE_HEADER: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#;

pub(crate) fn px(value: f64) -> i64 {
    (value * EMU_PER_PIXEL as f64).round() as i64
}

/// Escape text for XML element content and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Hex colour without `#`, upper case, validated.
fn srgb(color: &str) -> Result<String, RenderError> {
    let [r, g, b] = parse_hex_color(color)?;
    Ok(format!("{:02X}{:02X}{:02X}", r, g, b))
}

struct TextRun<'a> {
    text: &'a str,
    size_pt: u32,
    bold: bool,
    color: &'a str,
}

/// Absolute box in pixels.
#[derive(Clone, Copy)]
struct Frame {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

fn paragraph(run: &TextRun<'_>, align: &str) -> String {
    format!(
        r#"<a:p><a:pPr algn="{align}"/><a:r><a:rPr lang="ko-KR" sz="{sz}" b="{b}" dirty="0"><a:solidFill><a:srgbClr val="{color}"/></a:solidFill></a:rPr><a:t>{text}</a:t></a:r></a:p>"#,
        align = align,
        sz = run.size_pt * 100,
        b = if run.bold { 1 } else { 0 },
        color = run.color,
        text = escape_xml(run.text),
    )
}

fn text_box(id: u32, name: &str, frame: Frame, paragraphs: &[String]) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paras}</p:txBody></p:sp>"#,
        id = id,
        name = escape_xml(name),
        x = px(frame.x),
        y = px(frame.y),
        cx = px(frame.w),
        cy = px(frame.h),
        paras = paragraphs.concat(),
    )
}

fn filled_rect(id: u32, frame: Frame, color: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Accent"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{color}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
        id = id,
        x = px(frame.x),
        y = px(frame.y),
        cx = px(frame.w),
        cy = px(frame.h),
        color = color,
    )
}

struct Palette {
    background: String,
    title: String,
    body: String,
    accent: String,
}

impl Palette {
    fn from_settings(style: &PresentationSettings) -> Result<Self, RenderError> {
        Ok(Self {
            background: srgb(&style.background_color)?,
            title: srgb(&style.title_color)?,
            body: srgb(&style.body_color)?,
            accent: srgb(&style.accent_color)?,
        })
    }
}

fn slide_xml(slide: &Slide, is_title: bool, style: &PresentationSettings, palette: &Palette) -> String {
    let w = style.width as f64;
    let h = style.height as f64;
    let margin = w * 0.05;

    let mut shapes = Vec::new();
    if is_title {
        let title = TextRun {
            text: &slide.title,
            size_pt: style.title_font_size + 10,
            bold: true,
            color: &palette.title,
        };
        shapes.push(text_box(
            2,
            DECK_TITLE_SHAPE,
            Frame { x: margin, y: h * 0.33, w: w - 2.0 * margin, h: h * 0.16 },
            &[paragraph(&title, "ctr")],
        ));
        shapes.push(filled_rect(
            3,
            Frame { x: w * 0.4, y: h * 0.5, w: w * 0.2, h: (h * 0.006).max(4.0) },
            &palette.accent,
        ));
        if let Some(subtitle) = slide.bullets.first() {
            let run = TextRun {
                text: subtitle,
                size_pt: style.body_font_size,
                bold: false,
                color: &palette.body,
            };
            shapes.push(text_box(
                4,
                "Subtitle",
                Frame { x: margin * 2.0, y: h * 0.53, w: w - 4.0 * margin, h: h * 0.2 },
                &[paragraph(&run, "ctr")],
            ));
        }
    } else {
        let title = TextRun {
            text: &slide.title,
            size_pt: style.title_font_size,
            bold: true,
            color: &palette.title,
        };
        shapes.push(text_box(
            2,
            "Title",
            Frame { x: margin, y: h * 0.05, w: w - 2.0 * margin, h: h * 0.12 },
            &[paragraph(&title, "l")],
        ));
        shapes.push(filled_rect(
            3,
            Frame { x: margin, y: h * 0.18, w: w * 0.12, h: (h * 0.006).max(4.0) },
            &palette.accent,
        ));
        if !slide.bullets.is_empty() {
            let paras: Vec<String> = slide
                .bullets
                .iter()
                .map(|b| {
                    let text = format!("• {}", b);
                    paragraph(
                        &TextRun {
                            text: &text,
                            size_pt: style.body_font_size,
                            bold: false,
                            color: &palette.body,
                        },
                        "l",
                    )
                })
                .collect();
            shapes.push(text_box(
                4,
                "Body",
                Frame { x: margin * 1.5, y: h * 0.23, w: w - 3.0 * margin, h: h * 0.68 },
                &paras,
            ));
        }
    }

    format!(
        r#"{decl}<p:sld {ns}><p:cSld><p:bg><p:bgPr><a:solidFill><a:srgbClr val="{bg}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg><p:spTree>{hdr}{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        decl = XML_DECL,
        ns = NS,
        bg = palette.background,
        hdr = EMPTY_TREE_HEADER,
        shapes = shapes.concat(),
    )
}

fn notes_xml(notes: &str) -> String {
    let paras: String = notes
        .lines()
        .map(|line| format!("<a:p><a:r><a:rPr lang=\"ko-KR\" dirty=\"0\"/><a:t>{}</a:t></a:r></a:p>", escape_xml(line)))
        .collect();
    let paras = if paras.is_empty() { "<a:p><a:endParaRPr lang=\"ko-KR\"/></a:p>".to_string() } else { paras };
    format!(
        r#"{decl}<p:notes {ns}><p:cSld><p:spTree>{hdr}<p:sp><p:nvSpPr><p:cNvPr id="2" name="Notes Placeholder"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{paras}</p:txBody></p:sp></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>"#,
        decl = XML_DECL,
        ns = NS,
        hdr = EMPTY_TREE_HEADER,
        paras = paras,
    )
}

fn relationships(rels: &[(String, &str, String)]) -> String {
    let body: String = rels
        .iter()
        .map(|(id, kind, target)| {
            format!(
                r#"<Relationship Id="{}" Type="{}/{}" Target="{}"/>"#,
                id, REL_OFFICE, kind, target
            )
        })
        .collect();
    format!(r#"{}<Relationships xmlns="{}">{}</Relationships>"#, XML_DECL, REL_NS, body)
}

fn content_types(slide_count: usize) -> String {
    let mut overrides = vec![
        ("/ppt/presentation.xml", "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml".to_string()),
        ("/ppt/slideMasters/slideMaster1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml".to_string()),
        ("/ppt/slideLayouts/slideLayout1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml".to_string()),
        ("/ppt/notesMasters/notesMaster1.xml", "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml".to_string()),
        ("/ppt/theme/theme1.xml", "application/vnd.openxmlformats-officedocument.theme+xml".to_string()),
        ("/ppt/theme/theme2.xml", "application/vnd.openxmlformats-officedocument.theme+xml".to_string()),
        ("/docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml".to_string()),
    ]
    .into_iter()
    .map(|(part, ty)| format!(r#"<Override PartName="{}" ContentType="{}"/>"#, part, ty))
    .collect::<String>();

    for n in 1..=slide_count {
        overrides.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/><Override PartName="/ppt/notesSlides/notesSlide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml"/>"#,
            n = n
        ));
    }

    format!(
        r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{}</Types>"#,
        XML_DECL, overrides
    )
}

fn presentation_xml(slide_count: usize, style: &PresentationSettings) -> String {
    let ids: String = (0..slide_count)
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, 3 + i))
        .collect();
    format!(
        r#"{decl}<p:presentation {ns} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:notesMasterIdLst><p:notesMasterId r:id="rId2"/></p:notesMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{cx}" cy="{cy}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        decl = XML_DECL,
        ns = NS,
        ids = ids,
        cx = px(style.width as f64),
        cy = px(style.height as f64),
    )
}

fn core_xml(title: &str) -> String {
    format!(
        r#"{}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title><dc:creator>contents-autouploader</dc:creator></cp:coreProperties>"#,
        XML_DECL,
        escape_xml(title)
    )
}

fn slide_master_xml() -> String {
    format!(
        r#"{decl}<p:sldMaster {ns}><p:cSld><p:spTree>{hdr}</p:spTree></p:cSld>{clr}<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#,
        decl = XML_DECL,
        ns = NS,
        hdr = EMPTY_TREE_HEADER,
        clr = CLR_MAP,
    )
}

fn slide_layout_xml() -> String {
    format!(
        r#"{decl}<p:sldLayout {ns} type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>{hdr}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        decl = XML_DECL,
        ns = NS,
        hdr = EMPTY_TREE_HEADER,
    )
}

fn notes_master_xml() -> String {
    format!(
        r#"{decl}<p:notesMaster {ns}><p:cSld><p:spTree>{hdr}</p:spTree></p:cSld>{clr}</p:notesMaster>"#,
        decl = XML_DECL,
        ns = NS,
        hdr = EMPTY_TREE_HEADER,
        clr = CLR_MAP,
    )
}

fn theme_xml(palette: &Palette) -> String {
    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        r#"{decl}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Lecture"><a:themeElements><a:clrScheme name="Lecture"><a:dk1><a:srgbClr val="{title}"/></a:dk1><a:lt1><a:srgbClr val="{bg}"/></a:lt1><a:dk2><a:srgbClr val="{body}"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2><a:accent1><a:srgbClr val="{accent}"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2><a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4><a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6><a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink></a:clrScheme><a:fontScheme name="Lecture"><a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/><a:font script="Hang" typeface="맑은 고딕"/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/><a:font script="Hang" typeface="맑은 고딕"/></a:minorFont></a:fontScheme><a:fmtScheme name="Lecture"><a:fillStyleLst>{f}{f}{f}</a:fillStyleLst><a:lnStyleLst>{l}{l}{l}</a:lnStyleLst><a:effectStyleLst>{e}{e}{e}</a:effectStyleLst><a:bgFillStyleLst>{f}{f}{f}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#,
        decl = XML_DECL,
        title = palette.title,
        bg = palette.background,
        body = palette.body,
        accent = palette.accent,
        f = fill,
        l = line,
        e = effect,
    )
}

/// Write `presentation` as a `.pptx` file.
pub fn write_deck(
    presentation: &Presentation,
    style: &PresentationSettings,
    path: &Path,
) -> Result<(), RenderError> {
    let palette = Palette::from_settings(style)?;
    let n = presentation.slides.len();

    let mut parts: Vec<(String, String)> = vec![
        ("[Content_Types].xml".into(), content_types(n)),
        (
            "_rels/.rels".into(),
            relationships(&[
                ("rId1".into(), "officeDocument", "ppt/presentation.xml".into()),
            ])
            .replace(
                "</Relationships>",
                r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#,
            ),
        ),
        ("docProps/core.xml".into(), core_xml(&presentation.title)),
        ("ppt/presentation.xml".into(), presentation_xml(n, style)),
        ("ppt/slideMasters/slideMaster1.xml".into(), slide_master_xml()),
        (
            "ppt/slideMasters/_rels/slideMaster1.xml.rels".into(),
            relationships(&[
                ("rId1".into(), "slideLayout", "../slideLayouts/slideLayout1.xml".into()),
                ("rId2".into(), "theme", "../theme/theme1.xml".into()),
            ]),
        ),
        ("ppt/slideLayouts/slideLayout1.xml".into(), slide_layout_xml()),
        (
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".into(),
            relationships(&[("rId1".into(), "slideMaster", "../slideMasters/slideMaster1.xml".into())]),
        ),
        ("ppt/notesMasters/notesMaster1.xml".into(), notes_master_xml()),
        (
            "ppt/notesMasters/_rels/notesMaster1.xml.rels".into(),
            relationships(&[("rId1".into(), "theme", "../theme/theme2.xml".into())]),
        ),
        ("ppt/theme/theme1.xml".into(), theme_xml(&palette)),
        ("ppt/theme/theme2.xml".into(), theme_xml(&palette)),
    ];

    let mut pres_rels = vec![
        ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
        ("rId2".to_string(), "notesMaster", "notesMasters/notesMaster1.xml".to_string()),
    ];

    for (i, slide) in presentation.slides.iter().enumerate() {
        let num = i + 1;
        let is_title = presentation.has_title_slide && i == 0;
        pres_rels.push((format!("rId{}", 3 + i), "slide", format!("slides/slide{}.xml", num)));

        parts.push((format!("ppt/slides/slide{}.xml", num), slide_xml(slide, is_title, style, &palette)));
        parts.push((
            format!("ppt/slides/_rels/slide{}.xml.rels", num),
            relationships(&[
                ("rId1".into(), "slideLayout", "../slideLayouts/slideLayout1.xml".into()),
                ("rId2".into(), "notesSlide", format!("../notesSlides/notesSlide{}.xml", num)),
            ]),
        ));
        parts.push((format!("ppt/notesSlides/notesSlide{}.xml", num), notes_xml(&slide.notes)));
        parts.push((
            format!("ppt/notesSlides/_rels/notesSlide{}.xml.rels", num),
            relationships(&[
                ("rId1".into(), "notesMaster", "../notesMasters/notesMaster1.xml".into()),
                ("rId2".into(), "slide", format!("../slides/slide{}.xml", num)),
            ]),
        ));
    }
    pres_rels.push((format!("rId{}", 3 + n), "theme", "theme/theme1.xml".to_string()));
    parts.push(("ppt/_rels/presentation.xml.rels".into(), relationships(&pres_rels)));

    crate::util::ensure_parent(path)?;
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;

    log::debug!("Wrote {} slides to {}", n, path.display());
    Ok(())
}

fn read_part(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>, RenderError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Text of every `<a:p>` paragraph in an XML part, in document order.
/// Paragraphs without text are skipped.
pub fn paragraphs(xml: &str) -> Vec<String> {
    let (Ok(para_re), Ok(text_re)) = (
        Regex::new(r"(?s)<a:p>(.*?)</a:p>"),
        Regex::new(r"(?s)<a:t>(.*?)</a:t>"),
    ) else {
        return Vec::new();
    };

    para_re
        .captures_iter(xml)
        .map(|para| {
            text_re
                .captures_iter(&para[1])
                .map(|t| unescape_xml(&t[1]))
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Read a deck written by [`write_deck`] (or any simple text-box deck) back
/// into a [`Presentation`]. The first paragraph of each slide is its title,
/// the rest are bullets.
pub fn read_deck(path: &Path) -> Result<Presentation, RenderError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut numbers: Vec<usize> = archive
        .file_names()
        .filter_map(|name| {
            name.strip_prefix("ppt/slides/slide")
                .and_then(|rest| rest.strip_suffix(".xml"))
                .and_then(|n| n.parse().ok())
        })
        .collect();
    numbers.sort_unstable();

    if numbers.is_empty() {
        return Err(RenderError::MalformedDeck(format!(
            "{} contains no slides",
            path.display()
        )));
    }

    let mut slides = Vec::with_capacity(numbers.len());
    let mut has_title_slide = false;
    for (i, num) in numbers.iter().enumerate() {
        let xml = read_part(&mut archive, &format!("ppt/slides/slide{}.xml", num))?
            .ok_or_else(|| RenderError::MalformedDeck(format!("slide{}.xml missing", num)))?;
        if i == 0 && xml.contains(&format!("name=\"{}\"", DECK_TITLE_SHAPE)) {
            has_title_slide = true;
        }

        let mut texts = paragraphs(&xml).into_iter();
        let title = texts.next().unwrap_or_default();
        let bullets = texts
            .map(|t| t.trim_start_matches("• ").to_string())
            .collect();

        let notes = read_part(&mut archive, &format!("ppt/notesSlides/notesSlide{}.xml", num))?
            .map(|xml| paragraphs(&xml).join("\n"))
            .unwrap_or_default();

        slides.push(Slide {
            index: i,
            title,
            bullets,
            notes,
            image_path: None,
        });
    }

    let title = read_part(&mut archive, "docProps/core.xml")?
        .and_then(|xml| {
            let start = xml.find("<dc:title>")? + "<dc:title>".len();
            let end = xml[start..].find("</dc:title>")? + start;
            Some(unescape_xml(&xml[start..end]))
        })
        .filter(|t| !t.is_empty())
        .or_else(|| slides.first().map(|s| s.title.clone()))
        .unwrap_or_default();

    Ok(Presentation {
        title,
        slides,
        has_title_slide,
        file_path: Some(path.to_path_buf()),
    })
}

//! Minimal SpreadsheetML writer: one sheet of inline strings and numbers, with
//! an optional picture anchored in column A of each row.
use super::EmitError;
use crate::error::CatalogError;
use crate::helpers::xml::escape_text;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::reference::index_to_reference;
use crate::table::Value;
use log::debug;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const NS_DRAWING_MAIN: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const EMU_PER_PIXEL: f64 = 9525.0;
const POINTS_PER_PIXEL: f64 = 0.75;
const PIXELS_PER_CHARACTER: f64 = 7.0;
const DEFAULT_COLUMN_WIDTH: f64 = 18.0;

/// A JPEG file shown in column A, with its pixel size.
#[derive(Clone, Debug, PartialEq)]
pub struct Picture {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct WorkbookBuilder {
    sheet_name: String,
    header: Vec<String>,
    rows: Vec<(Vec<Value>, Option<Picture>)>,
    image_scale: f64,
}

impl WorkbookBuilder {
    pub fn new<S: AsRef<str>>(sheet_name: &str, header: &[S]) -> Self {
        WorkbookBuilder {
            sheet_name: sheet_name.to_owned(),
            header: header.iter().map(|name| name.as_ref().to_owned()).collect(),
            rows: Vec::new(),
            image_scale: 1.0,
        }
    }

    pub fn with_image_scale(mut self, scale: f64) -> Self {
        if scale > 0.0 {
            self.image_scale = scale;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows may be shorter than the header but never wider.
    pub fn push_row(&mut self, values: Vec<Value>, picture: Option<Picture>) -> Result<(), EmitError> {
        if values.len() > self.header.len() {
            return Err(EmitError::RowWidthError(self.header.len(), values.len()));
        }
        self.rows.push((values, picture));
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let pictures: Vec<(usize, &Picture)> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(index, (_, picture))| picture.as_ref().map(|picture| (index + 1, picture)))
            .collect();
        let has_drawing = !pictures.is_empty();

        let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
        write_part(&mut zip, "[Content_Types].xml", &content_types(has_drawing))?;
        write_part(&mut zip, "_rels/.rels", &package_relationships())?;
        write_part(&mut zip, "xl/workbook.xml", &self.workbook_xml())?;
        write_part(&mut zip, "xl/_rels/workbook.xml.rels", &workbook_relationships())?;
        write_part(&mut zip, "xl/styles.xml", &styles_xml())?;
        write_part(&mut zip, "xl/worksheets/sheet1.xml", &self.sheet_xml(has_drawing))?;
        if has_drawing {
            write_part(&mut zip, "xl/worksheets/_rels/sheet1.xml.rels", &sheet_relationships())?;
            write_part(&mut zip, "xl/drawings/drawing1.xml", &self.drawing_xml(&pictures))?;
            write_part(&mut zip, "xl/drawings/_rels/drawing1.xml.rels", &drawing_relationships(pictures.len()))?;
            for (number, (_, picture)) in pictures.iter().enumerate() {
                let bytes = std::fs::read(&picture.path)
                    .map_err(|_| EmitError::ThumbnailMissingError(picture.path.display().to_string()))?;
                // Already compressed.
                let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
                zip.start_file(format!("xl/media/image{}.jpeg", number + 1), options)?;
                zip.write_all(&bytes)?;
            }
        }
        zip.finish()?.flush()?;
        debug!("Wrote workbook {} with {} rows", path.display(), self.rows.len());
        Ok(())
    }

    fn scaled(&self, pixels: u32) -> f64 {
        (pixels as f64 * self.image_scale).round()
    }

    fn workbook_xml(&self) -> String {
        format!(
            r#"{XML_DECLARATION}<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_RELATIONSHIPS}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            escape_text(&self.sheet_name)
        )
    }

    fn sheet_xml(&self, has_drawing: bool) -> String {
        let mut xml = String::new();
        let _ = write!(xml, r#"{XML_DECLARATION}<worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_RELATIONSHIPS}">"#);

        if !self.header.is_empty() {
            let last_col = index_to_col(self.header.len() - 1);
            let picture_width = self
                .rows
                .iter()
                .filter_map(|(_, picture)| picture.as_ref())
                .map(|picture| self.scaled(picture.width))
                .fold(0.0, f64::max);
            let first_width = if picture_width > 0.0 { picture_width / PIXELS_PER_CHARACTER + 1.0 } else { DEFAULT_COLUMN_WIDTH };
            let _ = write!(xml, r#"<dimension ref="A1:{}{}"/>"#, last_col, self.rows.len() + 1);
            let _ = write!(xml, r#"<cols><col min="1" max="1" width="{first_width:.2}" customWidth="1"/>"#);
            if self.header.len() > 1 {
                let _ = write!(xml, r#"<col min="2" max="{}" width="{DEFAULT_COLUMN_WIDTH}" customWidth="1"/>"#, self.header.len());
            }
            xml.push_str("</cols>");
        }

        xml.push_str("<sheetData>");
        xml.push_str(r#"<row r="1">"#);
        for (col, name) in self.header.iter().enumerate() {
            push_cell(&mut xml, 0, col, &Value::text(name), Some(1));
        }
        xml.push_str("</row>");
        for (index, (values, picture)) in self.rows.iter().enumerate() {
            let row = index + 1;
            match picture {
                Some(picture) => {
                    let height = self.scaled(picture.height) * POINTS_PER_PIXEL;
                    let _ = write!(xml, r#"<row r="{}" ht="{height:.2}" customHeight="1">"#, row + 1);
                }
                None => {
                    let _ = write!(xml, r#"<row r="{}">"#, row + 1);
                }
            }
            for (col, value) in values.iter().enumerate() {
                push_cell(&mut xml, row, col, value, None);
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");

        if has_drawing {
            xml.push_str(r#"<drawing r:id="rId1"/>"#);
        }
        xml.push_str("</worksheet>");
        xml
    }

    fn drawing_xml(&self, pictures: &[(usize, &Picture)]) -> String {
        let mut xml = String::new();
        let _ = write!(xml, r#"{XML_DECLARATION}<xdr:wsDr xmlns:xdr="{NS_DRAWING}" xmlns:a="{NS_DRAWING_MAIN}" xmlns:r="{NS_RELATIONSHIPS}">"#);
        for (number, (row, picture)) in pictures.iter().enumerate() {
            let number = number + 1;
            let cx = (self.scaled(picture.width) * EMU_PER_PIXEL) as u64;
            let cy = (self.scaled(picture.height) * EMU_PER_PIXEL) as u64;
            let _ = write!(
                xml,
                concat!(
                    r#"<xdr:oneCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>"#,
                    r#"<xdr:ext cx="{cx}" cy="{cy}"/><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="{id}" name="Picture {number}"/>"#,
                    r#"<xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
                    r#"<xdr:blipFill><a:blip r:embed="rId{number}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
                    r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr>"#,
                    r#"</xdr:pic><xdr:clientData/></xdr:oneCellAnchor>"#
                ),
                row = row,
                cx = cx,
                cy = cy,
                id = number + 1,
                number = number,
            );
        }
        xml.push_str("</xdr:wsDr>");
        xml
    }
}

fn write_part<W: Write + std::io::Seek>(zip: &mut ZipWriter<W>, name: &str, content: &str) -> Result<(), CatalogError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

/// Empty values produce no cell.
fn push_cell(xml: &mut String, row: usize, col: usize, value: &Value, style: Option<usize>) {
    let reference = index_to_reference(row, col);
    let style = style.map(|style| format!(r#" s="{style}""#)).unwrap_or_default();
    match value {
        Value::Empty => (),
        Value::Number(number) if number.is_finite() => {
            let _ = write!(xml, r#"<c r="{reference}"{style}><v>{number}</v></c>"#);
        }
        value => {
            let _ = write!(
                xml,
                r#"<c r="{reference}"{style} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                escape_text(&value.to_string())
            );
        }
    }
}

fn content_types(has_drawing: bool) -> String {
    let mut xml = format!(
        concat!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Default Extension="jpeg" ContentType="image/jpeg"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
        ),
        XML_DECLARATION
    );
    if has_drawing {
        xml.push_str(r#"<Override PartName="/xl/drawings/drawing1.xml" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/>"#);
    }
    xml.push_str("</Types>");
    xml
}

fn package_relationships() -> String {
    format!(
        r#"{XML_DECLARATION}<Relationships xmlns="{NS_PACKAGE_RELATIONSHIPS}"><Relationship Id="rId1" Type="{REL_TYPE}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn workbook_relationships() -> String {
    format!(
        concat!(
            r#"{decl}<Relationships xmlns="{ns}">"#,
            r#"<Relationship Id="rId1" Type="{rel}/worksheet" Target="worksheets/sheet1.xml"/>"#,
            r#"<Relationship Id="rId2" Type="{rel}/styles" Target="styles.xml"/>"#,
            r#"</Relationships>"#
        ),
        decl = XML_DECLARATION,
        ns = NS_PACKAGE_RELATIONSHIPS,
        rel = REL_TYPE,
    )
}

fn sheet_relationships() -> String {
    format!(
        r#"{XML_DECLARATION}<Relationships xmlns="{NS_PACKAGE_RELATIONSHIPS}"><Relationship Id="rId1" Type="{REL_TYPE}/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#
    )
}

fn drawing_relationships(count: usize) -> String {
    let mut xml = format!(r#"{XML_DECLARATION}<Relationships xmlns="{NS_PACKAGE_RELATIONSHIPS}">"#);
    for number in 1..=count {
        let _ = write!(xml, r#"<Relationship Id="rId{number}" Type="{REL_TYPE}/image" Target="../media/image{number}.jpeg"/>"#);
    }
    xml.push_str("</Relationships>");
    xml
}

/// Style 0 is the default, style 1 the bold header.
fn styles_xml() -> String {
    format!(
        concat!(
            r#"{}<styleSheet xmlns="{}">"#,
            r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>"#,
            r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
            r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
            r#"<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>"#,
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
            r#"</styleSheet>"#
        ),
        XML_DECLARATION, NS_MAIN
    )
}

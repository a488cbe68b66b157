use serde::Deserialize;

/// Root `OFD.xml` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ofd {
    #[serde(rename = "@Version", default)]
    pub version: String,
    #[serde(rename = "@DocType", default)]
    pub doc_type: String,
    #[serde(rename = "DocBody", default)]
    pub doc_body: Vec<DocBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocBody {
    #[serde(rename = "DocInfo", default)]
    pub doc_info: DocInfo,
    #[serde(rename = "DocRoot", default)]
    pub doc_root: String,
    #[serde(rename = "Signatures")]
    pub signatures: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocInfo {
    #[serde(rename = "DocID", default)]
    pub doc_id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Author", default)]
    pub author: String,
    #[serde(rename = "Subject", default)]
    pub subject: String,
    #[serde(rename = "Abstract", default)]
    pub abstract_text: String,
    #[serde(rename = "CreationDate", default)]
    pub creation_date: String,
    #[serde(rename = "ModDate", default)]
    pub mod_date: String,
    #[serde(rename = "CustomDatas")]
    pub custom_datas: Option<CustomDatas>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomDatas {
    #[serde(rename = "CustomData", default)]
    pub custom_data: Vec<CustomData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomData {
    #[serde(rename = "@Name", default)]
    pub name: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// `Document.xml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(rename = "CommonData", default)]
    pub common_data: CommonData,
    #[serde(rename = "Pages", default)]
    pub pages: Pages,
    #[serde(rename = "Outlines", default)]
    pub outlines: Outlines,
    #[serde(rename = "Permissions", default)]
    pub permissions: Permissions,
    #[serde(rename = "Annotations")]
    pub annotations: Option<String>,
    #[serde(rename = "Signatures")]
    pub signatures: Option<String>,
    #[serde(rename = "Attachments", default)]
    pub attachments: Attachments,
    #[serde(rename = "Extensions", default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonData {
    #[serde(rename = "MaxUnitID", default)]
    pub max_unit_id: i64,
    #[serde(rename = "PageArea", default)]
    pub page_area: PageArea,
    #[serde(rename = "PublicRes", default)]
    pub public_res: String,
    #[serde(rename = "DocumentRes", default)]
    pub document_res: String,
    #[serde(rename = "TemplatePage", default)]
    pub template_page: Vec<TemplatePage>,
    #[serde(rename = "DefaultCS", default)]
    pub default_cs: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageArea {
    #[serde(rename = "PhysicalBox", default)]
    pub physical_box: String,
    #[serde(rename = "ApplicationBox", default)]
    pub application_box: String,
    #[serde(rename = "ContentBox", default)]
    pub content_box: String,
    #[serde(rename = "BleedBox", default)]
    pub bleed_box: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pages {
    #[serde(rename = "Page", default)]
    pub page: Vec<PageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRef {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@BaseLoc", default)]
    pub base_loc: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePage {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Name", default)]
    pub name: String,
    #[serde(rename = "@BaseLoc", default)]
    pub base_loc: String,
    #[serde(rename = "@ZOrder", default)]
    pub z_order: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outlines {
    #[serde(rename = "OutlineElem", default)]
    pub outline_elem: Vec<OutlineElem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineElem {
    #[serde(rename = "@Title", default)]
    pub title: String,
    #[serde(rename = "@Count", default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    #[serde(rename = "Edit", default)]
    pub edit: bool,
    #[serde(rename = "Print", default)]
    pub print: bool,
    #[serde(rename = "Export", default)]
    pub export: bool,
    #[serde(rename = "Copy", default)]
    pub copy: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachments {
    #[serde(rename = "Attachment", default)]
    pub attachment: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Name", default)]
    pub name: String,
    #[serde(rename = "@File", default)]
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extensions {
    #[serde(rename = "Extension", default)]
    pub extension: Vec<Extension>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extension {
    #[serde(rename = "@AppName", default)]
    pub app_name: String,
    #[serde(rename = "@Company", default)]
    pub company: String,
    #[serde(rename = "@AppVersion", default)]
    pub app_version: String,
    #[serde(rename = "@Date", default)]
    pub date: String,
    #[serde(rename = "@RefId", default)]
    pub ref_id: String,
    #[serde(rename = "Property", default)]
    pub property: Vec<Property>,
    #[serde(rename = "Data", default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Property {
    #[serde(rename = "@Name", default)]
    pub name: String,
    #[serde(rename = "@Type", default)]
    pub kind: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// Per-page `Content.xml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageContent {
    /// Filled from the page reference after load; not part of the XML.
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "Area", default)]
    pub area: PageArea,
    #[serde(rename = "Template", default)]
    pub template: Vec<TemplateRef>,
    #[serde(rename = "Content", default)]
    pub content: Content,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateRef {
    #[serde(rename = "@TemplateID", default)]
    pub template_id: String,
    #[serde(rename = "@ZOrder", default)]
    pub z_order: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(rename = "Layer", default)]
    pub layer: Vec<Layer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Layer {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@DrawParam", default)]
    pub draw_param: String,
    #[serde(rename = "TextObject", default)]
    pub text_object: Vec<TextObject>,
    #[serde(rename = "PathObject", default)]
    pub path_object: Vec<PathObject>,
    #[serde(rename = "ImageObject", default)]
    pub image_object: Vec<ImageObject>,
    #[serde(rename = "CompositeGraphicUnit", default)]
    pub composite_graphic_unit: Vec<CompositeGraphicUnit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Clips {
    #[serde(rename = "Clip", default)]
    pub clip: Vec<Clip>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Clip {
    #[serde(rename = "Area", default)]
    pub area: Vec<ClipArea>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipArea {
    #[serde(rename = "Path", default)]
    pub path: Vec<PathObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FillColor {
    #[serde(rename = "@Value", default)]
    pub value: String,
    #[serde(rename = "@Alpha")]
    pub alpha: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrokeColor {
    #[serde(rename = "@Value", default)]
    pub value: String,
    #[serde(rename = "@Alpha")]
    pub alpha: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextObject {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Boundary", default)]
    pub boundary: String,
    #[serde(rename = "@DrawParam", default)]
    pub draw_param: String,
    #[serde(rename = "@Font", default)]
    pub font: String,
    #[serde(rename = "@Size", default)]
    pub size: f64,
    #[serde(rename = "@Weight", default)]
    pub weight: i32,
    #[serde(rename = "@Italic", default)]
    pub italic: bool,
    #[serde(rename = "@Decoration", default)]
    pub decoration: String,
    #[serde(rename = "@HScale", default)]
    pub h_scale: f64,
    #[serde(rename = "@VScale", default)]
    pub v_scale: f64,
    #[serde(rename = "@CTM", default)]
    pub ctm: String,
    #[serde(rename = "@Fill")]
    pub fill: Option<bool>,
    #[serde(rename = "@Stroke")]
    pub stroke: Option<bool>,
    #[serde(rename = "FillColor")]
    pub fill_color: Option<FillColor>,
    #[serde(rename = "StrokeColor")]
    pub stroke_color: Option<StrokeColor>,
    #[serde(rename = "TextCode", default)]
    pub text_code: Vec<TextCode>,
    #[serde(rename = "Clips")]
    pub clips: Option<Clips>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextCode {
    #[serde(rename = "@X", default)]
    pub x: String,
    #[serde(rename = "@Y", default)]
    pub y: String,
    #[serde(rename = "@DeltaX", default)]
    pub delta_x: String,
    #[serde(rename = "@DeltaY", default)]
    pub delta_y: String,
    #[serde(rename = "@Index", default)]
    pub index: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathObject {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Boundary", default)]
    pub boundary: String,
    #[serde(rename = "@DrawParam", default)]
    pub draw_param: String,
    #[serde(rename = "@LineWidth", default)]
    pub line_width: f64,
    #[serde(rename = "@Join", default)]
    pub join: String,
    #[serde(rename = "@Cap", default)]
    pub cap: String,
    #[serde(rename = "@DashOffset", default)]
    pub dash_offset: f64,
    #[serde(rename = "@DashPattern", default)]
    pub dash_pattern: String,
    #[serde(rename = "@MiterLimit", default)]
    pub miter_limit: f64,
    #[serde(rename = "@CTM", default)]
    pub ctm: String,
    #[serde(rename = "@Fill")]
    pub fill: Option<bool>,
    #[serde(rename = "@Stroke")]
    pub stroke: Option<bool>,
    #[serde(rename = "FillColor")]
    pub fill_color: Option<FillColor>,
    #[serde(rename = "StrokeColor")]
    pub stroke_color: Option<StrokeColor>,
    #[serde(rename = "AbbreviatedData", default)]
    pub abbreviated_data: String,
    #[serde(rename = "Clips")]
    pub clips: Option<Clips>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageObject {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Boundary", default)]
    pub boundary: String,
    #[serde(rename = "@ResourceID", default)]
    pub resource_id: String,
    #[serde(rename = "@CTM", default)]
    pub ctm: String,
    #[serde(rename = "Clips")]
    pub clips: Option<Clips>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompositeGraphicUnit {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@ResourceID", default)]
    pub resource_id: String,
    #[serde(rename = "@DrawParam", default)]
    pub draw_param: String,
    #[serde(rename = "@CTM", default)]
    pub ctm: String,
    #[serde(rename = "TextObject", default)]
    pub text_object: Vec<TextObject>,
    #[serde(rename = "PathObject", default)]
    pub path_object: Vec<PathObject>,
    #[serde(rename = "ImageObject", default)]
    pub image_object: Vec<ImageObject>,
    #[serde(rename = "CompositeGraphicUnit", default)]
    pub composite_graphic_unit: Vec<CompositeGraphicUnit>,
    #[serde(rename = "Clips")]
    pub clips: Option<Clips>,
}

/// Resource file (`PublicRes.xml` / `DocumentRes.xml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Res {
    #[serde(rename = "@BaseLoc", default)]
    pub base_loc: String,
    #[serde(rename = "Fonts", default)]
    pub fonts: Fonts,
    #[serde(rename = "MultiMedias", default)]
    pub multi_medias: MultiMedias,
    #[serde(rename = "DrawParams", default)]
    pub draw_params: DrawParams,
    #[serde(rename = "CompositeGraphicUnits", default)]
    pub composite_graphic_units: CompositeGraphicUnits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fonts {
    #[serde(rename = "Font", default)]
    pub font: Vec<FontRec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FontRec {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@FontName", default)]
    pub font_name: String,
    #[serde(rename = "@FamilyName", default)]
    pub family_name: String,
    #[serde(rename = "@Bold", default)]
    pub bold: bool,
    #[serde(rename = "@Italic", default)]
    pub italic: bool,
    #[serde(rename = "FontFile", default)]
    pub font_file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultiMedias {
    #[serde(rename = "MultiMedia", default)]
    pub multi_media: Vec<MultiMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultiMedia {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Type", default)]
    pub kind: String,
    #[serde(rename = "@Format", default)]
    pub format: String,
    #[serde(rename = "MediaFile", default)]
    pub media_file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrawParams {
    #[serde(rename = "DrawParam", default)]
    pub draw_param: Vec<DrawParam>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrawParam {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Relative", default)]
    pub relative: String,
    #[serde(rename = "@LineWidth", default)]
    pub line_width: f64,
    #[serde(rename = "@Join", default)]
    pub join: String,
    #[serde(rename = "@Cap", default)]
    pub cap: String,
    #[serde(rename = "@DashOffset", default)]
    pub dash_offset: f64,
    #[serde(rename = "@DashPattern", default)]
    pub dash_pattern: String,
    #[serde(rename = "@MiterLimit", default)]
    pub miter_limit: f64,
    #[serde(rename = "@Font", default)]
    pub font: String,
    #[serde(rename = "@Size", default)]
    pub size: f64,
    #[serde(rename = "@Weight", default)]
    pub weight: i32,
    #[serde(rename = "@Italic", default)]
    pub italic: bool,
    #[serde(rename = "FillColor")]
    pub fill_color: Option<FillColor>,
    #[serde(rename = "StrokeColor")]
    pub stroke_color: Option<StrokeColor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompositeGraphicUnits {
    #[serde(rename = "CompositeGraphicUnit", default)]
    pub composite_graphic_unit: Vec<CompositeGraphicUnit>,
}

/// `Signatures.xml`: the list of signature files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureList {
    #[serde(rename = "@MaxSignId", default)]
    pub max_sign_id: String,
    #[serde(rename = "Signature", default)]
    pub signature: Vec<SignatureRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureRef {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@Type", default)]
    pub kind: String,
    #[serde(rename = "@BaseLoc", default)]
    pub base_loc: String,
}

/// An individual `Signature.xml` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureFile {
    #[serde(rename = "SignedValue", default)]
    pub signed_value: String,
    #[serde(rename = "SignedInfo", default)]
    pub signed_info: SignedInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedInfo {
    #[serde(rename = "StampAnnot", default)]
    pub stamp_annot: Vec<StampAnnot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StampAnnot {
    #[serde(rename = "@ID", default)]
    pub id: String,
    #[serde(rename = "@PageRef", default)]
    pub page_ref: String,
    #[serde(rename = "@Boundary", default)]
    pub boundary: String,
}

/// Drop namespace prefixes from element names so the serde model matches
/// local names the way producers that emit `ofd:`-qualified documents
/// expect. Only tag names are rewritten; text, attributes, comments and
/// declarations pass through untouched.
pub fn strip_ns_prefixes(xml: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(xml.len());
    let mut i = 0;
    while i < xml.len() {
        let b = xml[i];
        if b != b'<' {
            out.push(b);
            i += 1;
            continue;
        }
        out.push(b);
        i += 1;
        if i < xml.len() && xml[i] == b'/' {
            out.push(b'/');
            i += 1;
        }
        if i < xml.len() && (xml[i] == b'!' || xml[i] == b'?') {
            continue;
        }
        let start = i;
        let mut colon = None;
        while i < xml.len() && !is_name_end(xml[i]) {
            if xml[i] == b':' && colon.is_none() {
                colon = Some(i);
            }
            i += 1;
        }
        let name = match colon {
            Some(c) => &xml[c + 1..i],
            None => &xml[start..i],
        };
        out.extend_from_slice(name);
    }
    out
}

fn is_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/'
}

/// Decode an XML document into the data model, tolerating `ofd:` prefixes.
pub fn from_xml_bytes<T: serde::de::DeserializeOwned>(
    data: &[u8],
) -> Result<T, quick_xml::DeError> {
    let stripped = strip_ns_prefixes(data);
    let text = String::from_utf8_lossy(&stripped);
    quick_xml::de::from_str(text.as_ref())
}

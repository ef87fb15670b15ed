use log::{debug, trace};

use super::tree::{Document, Element};
use super::waypoint::{Action, Waypoint};
use crate::config::KmlConfig;
use crate::error::{Error, Result};

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
/// Every WPML schema version lives under this URI prefix.
pub const WPML_NAMESPACE_PREFIX: &str = "http://www.dji.com/wpmz/";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub author: String,
    pub timestamp_ms: i64,
    /// Used when the template does not declare a WPML namespace.
    pub wpml_namespace: String,
    pub default_height: f64,
}

impl SynthesisOptions {
    pub fn from_config(config: &KmlConfig, timestamp_ms: i64) -> SynthesisOptions {
        SynthesisOptions {
            author: config.author.clone(),
            timestamp_ms,
            wpml_namespace: config.wpml_namespace.clone(),
            default_height: config.default_height,
        }
    }
}

/// Namespace and prefix used for vendor elements of one document.
struct Wpml {
    uri: String,
    prefix: String,
}

impl Wpml {
    fn detect(root: &Element, fallback: &str) -> Wpml {
        match root.prefix_for(|uri| uri.starts_with(WPML_NAMESPACE_PREFIX)) {
            Some((prefix, uri)) if !prefix.is_empty() => Wpml {
                uri: uri.to_string(),
                prefix: prefix.to_string(),
            },
            _ => Wpml {
                uri: fallback.to_string(),
                prefix: "wpml".to_string(),
            },
        }
    }

    fn tag(&self, local: &str) -> String {
        format!("{}:{}", self.prefix, local)
    }

    fn set(&self, element: &mut Element, local: &str, text: &str) {
        element.set_child_text(&self.uri, local, &self.tag(local), text);
    }

    fn leaf(&self, parent: &Element, local: &str, text: &str) -> Element {
        parent.new_leaf(&self.tag(local), text)
    }
}

/// Indentation of `child` inside `parent`, taken from the separator.
fn indent_inside(parent: &Element) -> String {
    parent
        .child_separator()
        .and_then(|s| s.rsplit('\n').next().map(str::to_string))
        .unwrap_or_default()
}

fn missing(name: &str) -> Error {
    Error::MissingElement(name.to_string())
}

/// Same prefix as `sibling`, applied to a KML local name.
fn kml_tag(sibling: &Element, local: &str) -> String {
    match sibling.prefix() {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn set_coordinates(placemark: &mut Element, waypoint: &Waypoint) {
    let text = format!(
        "\n            {},{}\n          ",
        waypoint.longitude, waypoint.latitude
    );
    if let Some(coords) = placemark
        .find_mut(KML_NAMESPACE, "Point")
        .and_then(|point| point.find_mut(KML_NAMESPACE, "coordinates"))
    {
        coords.set_text(&text);
        return;
    }
    if let Some(coords) = placemark.find_descendant_mut("coordinates") {
        coords.set_text(&text);
        return;
    }
    let indent = indent_inside(placemark);
    let mut point = placemark.new_child(&kml_tag(placemark, "Point"));
    let coords = placemark.new_leaf(&kml_tag(placemark, "coordinates"), &text);
    point.append_indented(coords, &indent);
    placemark.append_element(point);
}

fn action_element(wpml: &Wpml, parent: &Element, indent: &str, id: usize, action: &Action) -> Element {
    let inner = format!("{indent}  ");
    let mut element = parent.new_child(&wpml.tag("action"));
    element.append_indented(wpml.leaf(parent, "actionId", &id.to_string()), indent);
    element.append_element(wpml.leaf(parent, "actionActuatorFunc", action.actuator_func()));
    let mut params = parent.new_child(&wpml.tag("actionActuatorFuncParam"));
    for (key, value) in action.params() {
        params.append_indented(wpml.leaf(parent, key, &value), &inner);
    }
    element.append_element(params);
    element
}

fn new_action_group(wpml: &Wpml, placemark: &Element, indent: &str, index: usize) -> Element {
    let idx = index.to_string();
    let mut group = placemark.new_child(&wpml.tag("actionGroup"));
    group.append_indented(wpml.leaf(placemark, "actionGroupId", &idx), indent);
    group.append_element(wpml.leaf(placemark, "actionGroupStartIndex", &idx));
    group.append_element(wpml.leaf(placemark, "actionGroupEndIndex", &idx));
    group.append_element(wpml.leaf(placemark, "actionGroupMode", "sequence"));
    let mut trigger = placemark.new_child(&wpml.tag("actionTrigger"));
    trigger.append_indented(
        wpml.leaf(placemark, "actionTriggerType", "reachPoint"),
        &format!("{indent}  "),
    );
    group.append_element(trigger);
    group
}

/// Replaces the actions of the placemark's action group, creating the
/// group when the template has none. Group id and trigger are kept; the
/// start/end indices point at this waypoint.
fn set_actions(wpml: &Wpml, placemark: &mut Element, index: usize, actions: &[Action]) {
    let indent = indent_inside(placemark);
    if placemark.find(&wpml.uri, "actionGroup").is_none() {
        let group = new_action_group(wpml, placemark, &indent, index);
        placemark.append_element(group);
    }
    let Some(group) = placemark.find_mut(&wpml.uri, "actionGroup") else {
        return;
    };
    group.remove_all(&wpml.uri, "action");
    let idx = index.to_string();
    wpml.set(group, "actionGroupStartIndex", &idx);
    wpml.set(group, "actionGroupEndIndex", &idx);
    let group_indent = indent_inside(group);
    for (i, action) in actions.iter().enumerate() {
        let element = action_element(wpml, group, &group_indent, i, action);
        group.append_indented(element, &indent);
    }
}

fn fill_placemark(
    wpml: &Wpml,
    placemark: &mut Element,
    index: usize,
    waypoint: &Waypoint,
    global_height: f64,
) {
    set_coordinates(placemark, waypoint);
    wpml.set(placemark, "index", &index.to_string());
    let height = waypoint.height.unwrap_or(global_height);
    wpml.set(placemark, "height", &height.to_string());
    if let Some(ellipsoid) = placemark.find_mut(&wpml.uri, "ellipsoidHeight") {
        ellipsoid.set_text(&(waypoint.altitude + height).to_string());
    }
    if !waypoint.actions.is_empty() {
        set_actions(wpml, placemark, index, &waypoint.actions);
    }
}

/// Rewrites the placemarks of a WPML document, one per waypoint in order.
///
/// The first placemark of the waypoint folder is the clone source; every
/// original placemark is removed and the new ones are inserted where the
/// first one stood. Author and create/update times are refreshed. All
/// other bytes of the template are written back unchanged.
pub fn edit_placemarks(xml: &str, waypoints: &[Waypoint], opts: &SynthesisOptions) -> Result<String> {
    let mut doc = Document::parse(xml)?;
    let root = doc.root_mut().ok_or_else(|| missing("kml"))?;
    let wpml = Wpml::detect(root, &opts.wpml_namespace);
    trace!("vendor namespace {} as {}:", wpml.uri, wpml.prefix);

    let document = if root.local_name() == "kml" {
        root.find_mut(KML_NAMESPACE, "Document")
            .ok_or_else(|| missing("Document"))?
    } else {
        root
    };
    if let Some(author) = document.find_mut(&wpml.uri, "author") {
        author.set_text(&opts.author);
    }
    let now = opts.timestamp_ms.to_string();
    for field in ["createTime", "updateTime"] {
        if let Some(element) = document.find_mut(&wpml.uri, field) {
            element.set_text(&now);
        }
    }

    let folder = document
        .find_mut(KML_NAMESPACE, "Folder")
        .ok_or_else(|| missing("Folder"))?;
    let template = folder
        .find(KML_NAMESPACE, "Placemark")
        .cloned()
        .ok_or_else(|| missing("Placemark"))?;
    let global_height = folder
        .find(&wpml.uri, "globalHeight")
        .and_then(|h| h.text().trim().parse::<f64>().ok())
        .unwrap_or(opts.default_height);

    let separator = folder.child_separator();
    let mut at = folder
        .remove_all(KML_NAMESPACE, "Placemark")
        .ok_or_else(|| missing("Placemark"))?;
    for (index, waypoint) in waypoints.iter().enumerate() {
        let mut placemark = template.clone();
        fill_placemark(&wpml, &mut placemark, index, waypoint, global_height);
        at = folder.insert_element(at, placemark, separator.as_deref());
    }
    debug!("wrote {} placemarks", waypoints.len());

    let body = doc.to_xml();
    if doc.has_declaration() {
        Ok(body)
    } else {
        Ok(format!("{XML_DECLARATION}{body}"))
    }
}

//! Schema document loader.
//!
//! Documents look like this:
//!
//! ```xml
//! <database name="league">
//!   <table name="players" engine="InnoDB" previous-names="members">
//!     <column name="id" type="INT UNSIGNED" autoinc="true"/>
//!     <column name="club_id" type="INT UNSIGNED" allownull="true"/>
//!     <column name="name" type="VARCHAR(200)" default=""/>
//!     <primary><col name="id"/></primary>
//!     <index type="index">
//!       <col name="club_id"/>
//!       <foreign-key table="clubs" column="id" delete="set-null"/>
//!     </index>
//!     <default_records>
//!       <record name="Nobody" created="now()"/>
//!     </default_records>
//!   </table>
//!   <view name="named_players">SELECT * FROM players WHERE name &lt;&gt; ''</view>
//! </database>
//! ```
//!
//! The document is read into an element tree first and then checked
//! element by element. Structural problems do not stop the walk; they are
//! collected per table and returned together.

use std::path::Path;

use indexmap::IndexMap;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::model::{
    Column, DefaultValue, ForeignKey, ForeignKeyRule, Index, IndexType, Record, Schema, Table,
    View,
};
use crate::dialect::is_identifier;
use crate::error::ParserError;

/// Error key for problems outside any table.
pub(crate) const ROOT: &str = "<root>";

type Errors = IndexMap<String, Vec<String>>;

fn report(errors: &mut Errors, key: &str, message: impl Into<String>) {
    errors.entry(key.to_string()).or_default().push(message.into());
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn check_attributes(&self, allowed: &[&str], errors: &mut Errors, key: &str) {
        for (name, _) in &self.attributes {
            if !allowed.contains(&name.as_str()) {
                report(
                    errors,
                    key,
                    format!("unknown attribute '{name}' on <{}>", self.name),
                );
            }
        }
    }

    fn required(&self, name: &str, errors: &mut Errors, key: &str) -> Option<&str> {
        let value = self.attr(name);
        if value.is_none() {
            report(
                errors,
                key,
                format!("<{}> is missing required attribute '{name}'", self.name),
            );
        }
        value
    }

    fn flag(&self, name: &str, errors: &mut Errors, key: &str) -> bool {
        match self.attr(name) {
            None | Some("false" | "0") => false,
            Some("true" | "1") => true,
            Some(other) => {
                report(
                    errors,
                    key,
                    format!(
                        "attribute '{name}' on <{}> must be true or false, got '{other}'",
                        self.name
                    ),
                );
                false
            }
        }
    }
}

fn malformed(position: u64, message: impl ToString) -> ParserError {
    ParserError::Malformed {
        position,
        message: message.to_string(),
    }
}

fn start_element(e: &BytesStart<'_>, position: u64) -> Result<Element, ParserError> {
    let mut element = Element {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(position, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(|err| malformed(position, err))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = name.strip_prefix('#')?;
            let code = match code.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(resolved.to_string())
}

fn read_tree(xml: &str) -> Result<Element, ParserError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => return Err(malformed(reader.error_position(), err)),
        };
        let position = reader.buffer_position();
        let finished = match event {
            Event::Start(e) => {
                stack.push(start_element(&e, position)?);
                None
            }
            Event::Empty(e) => Some(start_element(&e, position)?),
            Event::End(_) => stack.pop(),
            Event::Text(t) => {
                let text = t.xml_content().map_err(|err| malformed(position, err))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
                None
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
                None
            }
            Event::GeneralRef(r) => {
                let name = String::from_utf8_lossy(&r).into_owned();
                let resolved = resolve_entity(&name)
                    .ok_or_else(|| malformed(position, format!("unknown entity '&{name};'")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&resolved);
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };
        if let Some(element) = finished {
            match stack.last_mut() {
                Some(parent) => parent.children.push(element),
                None if root.is_none() => root = Some(element),
                None => return Err(malformed(position, "more than one root element")),
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            reader.buffer_position(),
            format!("unclosed element <{}>", open.name),
        ));
    }
    root.ok_or_else(|| malformed(0, "document has no root element"))
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn column_names(element: &Element, errors: &mut Errors, key: &str) -> Vec<String> {
    let mut columns = Vec::new();
    for child in &element.children {
        if child.name != "col" {
            continue;
        }
        child.check_attributes(&["name"], errors, key);
        if let Some(name) = child.required("name", errors, key) {
            columns.push(name.to_string());
        }
    }
    columns
}

fn build_column(element: &Element, errors: &mut Errors, key: &str) -> Option<Column> {
    element.check_attributes(
        &[
            "name",
            "type",
            "allownull",
            "autoinc",
            "default",
            "default-raw",
            "previous-names",
        ],
        errors,
        key,
    );
    if let Some(child) = element.children.first() {
        report(errors, key, format!("unexpected <{}> inside <column>", child.name));
    }
    let name = element.required("name", errors, key);
    let sql_type = element.required("type", errors, key);
    let nullable = element.flag("allownull", errors, key);
    let auto_increment = element.flag("autoinc", errors, key);
    let default = match (element.attr("default"), element.attr("default-raw")) {
        (Some(_), Some(_)) => {
            report(errors, key, "column cannot have both 'default' and 'default-raw'");
            None
        }
        (Some("NULL"), None) => Some(DefaultValue::Null),
        (Some(value), None) => Some(DefaultValue::String(value.to_string())),
        (None, Some(raw)) => Some(DefaultValue::Expression(raw.to_string())),
        (None, None) => None,
    };

    let (name, sql_type) = (name?, sql_type?);
    if !is_identifier(name) {
        report(errors, key, format!("invalid column name '{name}'"));
    }
    let mut column = Column::new(name, sql_type.trim())
        .nullable(nullable)
        .previous_names(split_list(element.attr("previous-names")));
    column.auto_increment = auto_increment;
    column.default = default;
    Some(column)
}

fn build_index(
    element: &Element,
    table: &str,
    errors: &mut Errors,
) -> (Option<Index>, Option<ForeignKey>) {
    element.check_attributes(&["type", "name"], errors, table);
    let index_type = match element.attr("type").unwrap_or("index").parse::<IndexType>() {
        Ok(t) => t,
        Err(err) => {
            report(errors, table, err.to_string());
            IndexType::Index
        }
    };
    for child in &element.children {
        if !matches!(child.name.as_str(), "col" | "foreign-key") {
            report(errors, table, format!("unexpected <{}> inside <index>", child.name));
        }
    }
    let columns = column_names(element, errors, table);
    if columns.is_empty() {
        report(errors, table, "<index> needs at least one <col>");
        return (None, None);
    }
    let name = element
        .attr("name")
        .map_or_else(|| Index::default_name(table, &columns, index_type), String::from);

    let mut foreign_keys = element.children.iter().filter(|c| c.name == "foreign-key");
    let foreign_key = foreign_keys.next().and_then(|fk| {
        fk.check_attributes(&["table", "column", "update", "delete", "name"], errors, table);
        if columns.len() != 1 {
            report(
                errors,
                table,
                format!("foreign key index '{name}' must have exactly one column"),
            );
        }
        let target_table = fk.required("table", errors, table)?;
        let target_column = fk.required("column", errors, table)?;
        let mut rule = |attr: &str| match fk.attr(attr).map(str::parse::<ForeignKeyRule>) {
            None => ForeignKeyRule::default(),
            Some(Ok(rule)) => rule,
            Some(Err(err)) => {
                report(errors, table, format!("{attr}: {err}"));
                ForeignKeyRule::default()
            }
        };
        let on_update = rule("update");
        let on_delete = rule("delete");
        let mut key = ForeignKey::new(table, &columns[0], target_table, target_column)
            .rules(on_update, on_delete);
        key.name = fk.attr("name").map(String::from);
        Some(key)
    });
    if foreign_keys.next().is_some() {
        report(
            errors,
            table,
            format!("index '{name}' declares more than one <foreign-key>"),
        );
    }
    (Some(Index::new(name, index_type, columns)), foreign_key)
}

fn build_table(element: &Element, errors: &mut Errors) -> Option<Table> {
    let key = element.attr("name").unwrap_or(ROOT).to_string();
    element.check_attributes(
        &["name", "engine", "charset", "collation", "previous-names"],
        errors,
        &key,
    );
    let name = element.required("name", errors, &key)?;
    if !is_identifier(name) {
        report(errors, &key, format!("invalid table name '{name}'"));
    }

    let mut table = Table::new(name).previous_names(split_list(element.attr("previous-names")));
    table.attributes.engine = element.attr("engine").map(String::from);
    table.attributes.charset = element.attr("charset").map(String::from);
    table.attributes.collation = element.attr("collation").map(String::from);

    let mut primary_key: Option<Vec<String>> = None;
    for child in &element.children {
        match child.name.as_str() {
            "column" => {
                if let Some(column) = build_column(child, errors, &key) {
                    if table.columns.contains_key(&column.name) {
                        report(errors, &key, format!("duplicate column '{}'", column.name));
                    }
                    table.add_column(column);
                }
            }
            "index" => {
                let (index, foreign_key) = build_index(child, name, errors);
                if let Some(index) = index {
                    table.add_index(index);
                }
                if let Some(foreign_key) = foreign_key {
                    table.foreign_keys.push(foreign_key);
                }
            }
            "primary" => {
                child.check_attributes(&[], errors, &key);
                if primary_key.is_some() {
                    report(errors, &key, "more than one <primary>");
                }
                primary_key = Some(column_names(child, errors, &key));
            }
            "default_records" => {
                child.check_attributes(&[], errors, &key);
                for record in &child.children {
                    if record.name != "record" {
                        report(
                            errors,
                            &key,
                            format!("unexpected <{}> inside <default_records>", record.name),
                        );
                        continue;
                    }
                    let values: Record = record.attributes.iter().cloned().collect();
                    table.default_records.push(values);
                }
            }
            other => report(errors, &key, format!("unexpected <{other}> inside <table>")),
        }
    }
    if table.columns.is_empty() {
        report(errors, &key, "table declares no columns");
    }
    table.set_primary_key(primary_key.unwrap_or_default());
    Some(table)
}

fn build_schema(root: &Element, errors: &mut Errors) -> Schema {
    if root.name != "database" {
        report(
            errors,
            ROOT,
            format!("root element must be <database>, found <{}>", root.name),
        );
        return Schema::default();
    }
    root.check_attributes(&["name"], errors, ROOT);
    let mut schema = Schema::new(root.attr("name").unwrap_or_default());
    for child in &root.children {
        match child.name.as_str() {
            "table" => {
                if let Some(table) = build_table(child, errors) {
                    schema.merge_table(table);
                }
            }
            "view" => {
                child.check_attributes(&["name"], errors, ROOT);
                let Some(name) = child.required("name", errors, ROOT) else {
                    continue;
                };
                let sql = child.text.trim();
                if sql.is_empty() {
                    report(errors, ROOT, format!("view '{name}' has no SQL body"));
                    continue;
                }
                schema.views.insert(name.to_string(), View::new(name, sql));
            }
            other => report(errors, ROOT, format!("unexpected <{other}> inside <database>")),
        }
    }
    schema
}

/// Parses one schema document.
pub fn parse_str(xml: &str) -> Result<Schema, ParserError> {
    let root = read_tree(xml)?;
    let mut errors = Errors::new();
    let schema = build_schema(&root, &mut errors);
    if errors.is_empty() {
        Ok(schema)
    } else {
        Err(ParserError::Invalid { errors })
    }
}

/// Reads and parses one schema document.
pub fn load_file(path: impl AsRef<Path>) -> Result<Schema, ParserError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|err| ParserError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let schema = parse_str(&xml)?;
    tracing::debug!(
        path = %path.display(),
        tables = schema.tables.len(),
        views = schema.views.len(),
        "Loaded schema document"
    );
    Ok(schema)
}

/// Reads several documents and merges them in order.
///
/// Structural errors from every document are collected before failing;
/// unreadable or malformed documents fail immediately.
pub fn load_files<I, P>(paths: I) -> Result<Schema, ParserError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut merged = Schema::default();
    let mut errors = Errors::new();
    for path in paths {
        match load_file(path) {
            Ok(schema) => merged.merge(schema),
            Err(ParserError::Invalid { errors: found }) => {
                for (key, list) in found {
                    errors.entry(key).or_default().extend(list);
                }
            }
            Err(other) => return Err(other),
        }
    }
    if errors.is_empty() {
        Ok(merged)
    } else {
        Err(ParserError::Invalid { errors })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const LEAGUE: &str = r#"
        <database name="league">
          <table name="clubs" engine="InnoDB" charset="utf8mb4">
            <column name="id" type="INT UNSIGNED" autoinc="true"/>
            <column name="name" type="VARCHAR(200)"/>
            <column name="created" type="DATETIME" default-raw="CURRENT_TIMESTAMP"/>
            <primary><col name="id"/></primary>
            <index type="unique"><col name="name"/></index>
            <default_records>
              <record name="Free agents" created="now()"/>
            </default_records>
          </table>
          <table name="players" previous-names="members, people">
            <column name="id" type="INT UNSIGNED" autoinc="1"/>
            <column name="club_id" type="INT UNSIGNED" allownull="true"/>
            <column name="nick" type="VARCHAR(50)" default="" previous-names="alias"/>
            <primary><col name="id"/></primary>
            <index type="index" name="players_club">
              <col name="club_id"/>
              <foreign-key table="clubs" column="id" update="cascade" delete="set-null"/>
            </index>
          </table>
          <view name="named_players"><![CDATA[SELECT * FROM players WHERE nick <> '']]></view>
          <view name="small_clubs">SELECT * FROM clubs WHERE id &lt; 10</view>
        </database>
    "#;

    #[test]
    fn parses_a_full_document() {
        let schema = parse_str(LEAGUE).unwrap();
        assert_eq!(schema.name, "league");
        assert_eq!(schema.tables.keys().collect::<Vec<_>>(), ["clubs", "players"]);

        let clubs = &schema.tables["clubs"];
        assert_eq!(clubs.attributes.engine.as_deref(), Some("InnoDB"));
        assert_eq!(clubs.primary_key, ["id"]);
        assert!(clubs.columns["id"].auto_increment);
        assert!(clubs.columns["id"].primary_key);
        assert_eq!(
            clubs.columns["created"].default,
            Some(DefaultValue::Expression(String::from("CURRENT_TIMESTAMP")))
        );
        assert_eq!(clubs.indexes[0].name, "clubs_name_uniq");
        assert_eq!(clubs.indexes[0].index_type, IndexType::Unique);
        assert_eq!(clubs.default_records[0]["created"], "now()");

        let players = &schema.tables["players"];
        assert_eq!(players.previous_names, ["members", "people"]);
        assert!(players.columns["club_id"].nullable);
        assert_eq!(players.columns["nick"].previous_names, ["alias"]);
        assert_eq!(
            players.columns["nick"].default,
            Some(DefaultValue::String(String::new()))
        );
        let fk = &players.foreign_keys[0];
        assert_eq!(
            (fk.table.as_str(), fk.column.as_str(), fk.target_table.as_str()),
            ("players", "club_id", "clubs")
        );
        assert_eq!(fk.on_update, ForeignKeyRule::Cascade);
        assert_eq!(fk.on_delete, ForeignKeyRule::SetNull);
        assert_eq!(fk.constraint_name(), "fk_players_club_id");

        assert_eq!(
            schema.views["named_players"].sql,
            "SELECT * FROM players WHERE nick <> ''"
        );
        assert_eq!(
            schema.views["small_clubs"].sql,
            "SELECT * FROM clubs WHERE id < 10"
        );
    }

    #[test]
    fn structural_errors_are_collected_per_table() {
        let xml = r#"
            <database>
              <table name="a">
                <column name="id" type="INT UNSIGNED" autoinc="yes" color="red"/>
                <column type="INT"/>
                <index type="fulltext"><col name="id"/></index>
                <trigger/>
              </table>
              <table name="b"/>
              <sequence name="s"/>
            </database>
        "#;
        let Err(ParserError::Invalid { errors }) = parse_str(xml) else {
            panic!("expected structural errors");
        };
        assert_eq!(errors["a"].len(), 5, "{:?}", errors["a"]);
        assert_eq!(errors["b"], ["table declares no columns"]);
        assert_eq!(errors[ROOT], ["unexpected <sequence> inside <database>"]);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            parse_str("<database><table name=\"a\"></database>"),
            Err(ParserError::Malformed { .. })
        ));
        assert!(matches!(parse_str(""), Err(ParserError::Malformed { .. })));
        assert!(matches!(
            parse_str("<schema/>"),
            Err(ParserError::Invalid { .. })
        ));
    }

    #[test]
    fn later_documents_only_add_columns_and_indexes() {
        let first = r#"
            <database>
              <table name="clubs" engine="InnoDB">
                <column name="id" type="INT UNSIGNED" autoinc="true"/>
                <primary><col name="id"/></primary>
              </table>
            </database>
        "#;
        let second = r#"
            <database>
              <table name="clubs" engine="MyISAM">
                <column name="code" type="CHAR(3)"/>
                <primary><col name="code"/></primary>
                <index><col name="code"/></index>
              </table>
            </database>
        "#;
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, xml) in [first, second].into_iter().enumerate() {
            let path = dir.path().join(format!("schema{i}.xml"));
            std::fs::File::create(&path)
                .unwrap()
                .write_all(xml.as_bytes())
                .unwrap();
            paths.push(path);
        }

        let schema = load_files(&paths).unwrap();
        let clubs = &schema.tables["clubs"];
        assert_eq!(clubs.columns.keys().collect::<Vec<_>>(), ["id", "code"]);
        assert_eq!(clubs.attributes.engine.as_deref(), Some("InnoDB"));
        assert_eq!(clubs.primary_key, ["id"]);
        assert_eq!(clubs.indexes.len(), 1);
    }

    #[test]
    fn merged_indexes_bring_their_foreign_keys() {
        let first = r#"
            <database>
              <table name="players">
                <column name="id" type="INT UNSIGNED" autoinc="true"/>
                <primary><col name="id"/></primary>
              </table>
            </database>
        "#;
        let second = r#"
            <database>
              <table name="players">
                <column name="club_id" type="INT UNSIGNED" allownull="true"/>
                <index>
                  <col name="club_id"/>
                  <foreign-key table="clubs" column="id" delete="set-null"/>
                </index>
              </table>
            </database>
        "#;
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, xml) in [first, second].into_iter().enumerate() {
            let path = dir.path().join(format!("schema{i}.xml"));
            std::fs::write(&path, xml).unwrap();
            paths.push(path);
        }

        let schema = load_files(&paths).unwrap();
        let players = &schema.tables["players"];
        assert_eq!(players.indexes.len(), 1);
        assert_eq!(players.foreign_keys.len(), 1);
        let fk = &players.foreign_keys[0];
        assert_eq!((fk.column.as_str(), fk.target_table.as_str()), ("club_id", "clubs"));
        assert_eq!(fk.on_delete, ForeignKeyRule::SetNull);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_file(dir.path().join("absent.xml")),
            Err(ParserError::Io { .. })
        ));
    }
}

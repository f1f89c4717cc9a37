// src/ingest/parser.rs
//! RSS 2.0, RSS 1.0 (RDF) and Atom parsing with `quick-xml`'s event reader.
//! Entries are returned in document order, which feeds use for newest-first.
//!
//! Fields are matched on their full qualified name, so extension elements
//! such as `atom:link`, `media:title` or `itunes:title` inside an item never
//! shadow the plain `link`/`title`.

use std::borrow::Cow;

use anyhow::{anyhow, bail, Context, Result};
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use regex::{Captures, Regex};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{Entry, FeedParser};
use crate::ingest::{clean_description, plain_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Rss,
    Rdf,
    Atom,
}

impl FeedKind {
    fn label(self) -> &'static str {
        match self {
            FeedKind::Rss => "rss",
            FeedKind::Rdf => "rdf",
            FeedKind::Atom => "atom",
        }
    }

    fn item_tag(self) -> &'static [u8] {
        match self {
            FeedKind::Rss | FeedKind::Rdf => b"item",
            FeedKind::Atom => b"entry",
        }
    }
}

/// Root element of the document. `prefix` is the root's own namespace
/// prefix (`atom:` for `<atom:feed>`), stripped from Atom field names.
struct Root {
    kind: FeedKind,
    prefix: Vec<u8>,
}

/// Raw field text of one `<item>`/`<entry>`; the first occurrence wins.
#[derive(Debug, Default)]
struct RawItem {
    id: Option<String>,
    guid: Option<String>,
    title: Option<String>,
    link: Option<String>,
    links: Vec<AtomLink>,
    pub_date: Option<String>,
    dc_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default)]
struct AtomLink {
    href: String,
    rel: Option<String>,
}

/// Default parser used by the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFeedParser;

impl FeedParser for XmlFeedParser {
    fn parse(&self, raw: &[u8]) -> Result<Vec<Entry>> {
        parse_feed(raw)
    }
}

/// Parse a feed document of any supported flavour.
pub fn parse_feed(raw: &[u8]) -> Result<Vec<Entry>> {
    let t0 = std::time::Instant::now();
    let text = String::from_utf8_lossy(raw);
    let xml = scrub_html_entities_for_xml(text.trim_start_matches('\u{feff}'));

    let root = sniff_root(&xml)?;
    let items = read_items(&xml, &root)
        .with_context(|| format!("parsing {} xml", root.kind.label()))?;
    let entries = match root.kind {
        FeedKind::Rss | FeedKind::Rdf => items.into_iter().map(rss_entry).collect(),
        FeedKind::Atom => items.into_iter().map(atom_entry).collect::<Vec<_>>(),
    };

    histogram!(crate::metrics::PARSE_DURATION).record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

fn sniff_root(xml: &str) -> Result<Root> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading feed xml")? {
            Event::Start(e) | Event::Empty(e) => {
                let kind = match e.local_name().as_ref() {
                    b"rss" => FeedKind::Rss,
                    b"RDF" => FeedKind::Rdf,
                    b"feed" => FeedKind::Atom,
                    other => {
                        return Err(anyhow!(
                            "unsupported feed root element <{}>",
                            String::from_utf8_lossy(other)
                        ))
                    }
                };
                let name = e.name();
                let prefix = match name.as_ref().iter().position(|&b| b == b':') {
                    Some(colon) if kind == FeedKind::Atom => name.as_ref()[..=colon].to_vec(),
                    _ => Vec::new(),
                };
                return Ok(Root { kind, prefix });
            }
            Event::Eof => bail!("feed document has no root element"),
            _ => {}
        }
    }
}

/// Every item/entry in document order, wherever it sits under the root.
fn read_items(xml: &str, root: &Root) -> Result<Vec<RawItem>> {
    let mut reader = Reader::from_str(xml);
    let item_tag = [root.prefix.as_slice(), root.kind.item_tag()].concat();
    let mut items = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == item_tag.as_slice() => {
                items.push(read_item(&mut reader, root)?);
            }
            Event::Empty(e) if e.name().as_ref() == item_tag.as_slice() => {
                items.push(RawItem::default());
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof if depth > 0 => bail!("feed document ended before its root was closed"),
            Event::Eof => return Ok(items),
            _ => {}
        }
    }
}

fn read_item(reader: &mut Reader<&[u8]>, root: &Root) -> Result<RawItem> {
    let mut it = RawItem::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if root.kind == FeedKind::Atom && field_name(name, root) == b"link" {
                    it.links.push(atom_link(&e)?);
                    reader.read_to_end(name)?;
                    continue;
                }
                let Some(slot) = field_slot(&mut it, field_name(name, root), root.kind) else {
                    reader.read_to_end(name)?;
                    continue;
                };
                let text = read_inner(reader, name)?;
                if slot.is_none() {
                    *slot = Some(text);
                }
            }
            Event::Empty(e) => {
                if root.kind == FeedKind::Atom && field_name(e.name(), root) == b"link" {
                    it.links.push(atom_link(&e)?);
                }
            }
            Event::End(_) => return Ok(it),
            Event::Eof => bail!(
                "feed document ended inside <{}>",
                String::from_utf8_lossy(root.kind.item_tag())
            ),
            _ => {}
        }
    }
}

fn field_name<'n>(name: QName<'n>, root: &Root) -> &'n [u8] {
    let raw = name.0;
    raw.strip_prefix(root.prefix.as_slice()).unwrap_or(raw)
}

fn field_slot<'i>(
    it: &'i mut RawItem,
    name: &[u8],
    kind: FeedKind,
) -> Option<&'i mut Option<String>> {
    let slot = match (kind, name) {
        (FeedKind::Rss | FeedKind::Rdf, b"guid") => &mut it.guid,
        (FeedKind::Rss | FeedKind::Rdf, b"title") => &mut it.title,
        (FeedKind::Rss | FeedKind::Rdf, b"link") => &mut it.link,
        (FeedKind::Rss | FeedKind::Rdf, b"pubDate") => &mut it.pub_date,
        (FeedKind::Rss | FeedKind::Rdf, b"dc:date") => &mut it.dc_date,
        (FeedKind::Rss | FeedKind::Rdf, b"description") => &mut it.description,
        (FeedKind::Atom, b"id") => &mut it.id,
        (FeedKind::Atom, b"title") => &mut it.title,
        (FeedKind::Atom, b"published") => &mut it.published,
        (FeedKind::Atom, b"updated") => &mut it.updated,
        (FeedKind::Atom, b"summary") => &mut it.summary,
        (FeedKind::Atom, b"content") => &mut it.content,
        _ => return None,
    };
    Some(slot)
}

/// Text of the element just opened, up to its matching end tag. Child
/// elements (`type="xhtml"` titles and content) are kept as markup so the
/// caller can flatten them with [`plain_text`].
fn read_inner(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Text(t) => out.push_str(&t.unescape()?),
            Event::CData(c) => out.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(e) => {
                depth += 1;
                out.push('<');
                out.push_str(&String::from_utf8_lossy(&e));
                out.push('>');
            }
            Event::Empty(e) => {
                out.push('<');
                out.push_str(&String::from_utf8_lossy(&e));
                out.push_str("/>");
            }
            Event::End(e) if depth > 0 => {
                depth -= 1;
                out.push_str("</");
                out.push_str(&String::from_utf8_lossy(e.name().as_ref()));
                out.push('>');
            }
            Event::End(_) => return Ok(out),
            Event::Eof => bail!(
                "feed document ended inside <{}>",
                String::from_utf8_lossy(end.as_ref())
            ),
            _ => {}
        }
    }
}

fn atom_link(e: &BytesStart<'_>) -> Result<AtomLink> {
    let mut link = AtomLink::default();
    for attr in e.attributes() {
        let attr = attr.context("reading <link> attributes")?;
        match attr.key.as_ref() {
            b"href" => link.href = attr.unescape_value()?.into_owned(),
            b"rel" => link.rel = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(link)
}

fn rss_entry(it: RawItem) -> Entry {
    let published = it
        .pub_date
        .as_deref()
        .and_then(parse_rfc2822)
        .or_else(|| it.dc_date.as_deref().and_then(parse_rfc3339));

    Entry {
        guid: it.guid.map(|g| g.trim().to_string()).unwrap_or_default(),
        link: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
        title: it.title.as_deref().map(plain_text).unwrap_or_default(),
        description: it
            .description
            .as_deref()
            .map(clean_description)
            .unwrap_or_default(),
        published,
        summary: None,
    }
}

fn atom_entry(it: RawItem) -> Entry {
    // rel="alternate" (or no rel) is the entry's web page.
    let link = it
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| it.links.first())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let body = it
        .summary
        .filter(|t| !t.trim().is_empty())
        .or(it.content)
        .map(|t| clean_description(&t))
        .unwrap_or_default();

    let published = it
        .published
        .as_deref()
        .and_then(parse_rfc3339)
        .or_else(|| it.updated.as_deref().and_then(parse_rfc3339));

    Entry {
        guid: it.id.map(|id| id.trim().to_string()).unwrap_or_default(),
        link,
        title: it.title.as_deref().map(plain_text).unwrap_or_default(),
        description: body,
        published,
        summary: None,
    }
}

fn parse_rfc2822(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()
}

fn parse_rfc3339(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339).ok()
}

fn entity_regex() -> &'static Regex {
    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    RE_ENTITY.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]{0,31});").expect("entity regex"))
}

/// quick-xml only knows the five XML entities; feeds routinely ship HTML
/// ones. Known HTML names become numeric references, unknown ones are
/// escaped so they survive as literal text.
fn scrub_html_entities_for_xml(s: &str) -> Cow<'_, str> {
    entity_regex().replace_all(s, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return whole.to_string();
        }
        let decoded = html_escape::decode_html_entities(whole);
        if decoded == whole {
            return format!("&amp;{name};");
        }
        decoded.chars().map(|c| format!("&#{};", u32::from(c))).collect()
    })
}

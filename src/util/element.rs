//! Platform tag tables and the element-name grammar.
//!
//! These sets gate template compatibility (which tags are components, which
//! close implicitly, which never take children) and must match the HTML5
//! behavior the compiler was written against.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;

/// A membership table over a comma-separated tag list.
pub struct TagSet {
    set: FxHashSet<&'static str>,
    lowercase: bool,
}

impl TagSet {
    fn new(list: &'static str, lowercase: bool) -> Self {
        Self {
            set: list.split(',').collect(),
            lowercase,
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        if self.lowercase {
            self.set.contains(tag.to_ascii_lowercase().as_str())
        } else {
            self.set.contains(tag)
        }
    }
}

static HTML_TAGS: LazyLock<TagSet> = LazyLock::new(|| {
    TagSet::new(
        "html,body,base,head,link,meta,style,title,\
         address,article,aside,footer,header,h1,h2,h3,h4,h5,h6,hgroup,nav,section,\
         div,dd,dl,dt,figcaption,figure,picture,hr,img,li,main,ol,p,pre,ul,\
         a,b,abbr,bdi,bdo,br,cite,code,data,dfn,em,i,kbd,mark,q,rp,rt,rtc,ruby,\
         s,samp,small,span,strong,sub,sup,time,u,var,wbr,area,audio,map,track,video,\
         embed,object,param,source,canvas,script,noscript,del,ins,\
         caption,col,colgroup,table,thead,tbody,td,th,tr,\
         button,datalist,fieldset,form,input,label,legend,meter,optgroup,option,\
         output,progress,select,textarea,\
         details,dialog,menu,menuitem,summary,\
         content,element,shadow,template,blockquote,iframe,tfoot",
        true,
    )
});

static SVG_TAGS: LazyLock<TagSet> = LazyLock::new(|| {
    TagSet::new(
        "svg,animate,circle,clippath,cursor,defs,desc,ellipse,filter,font-face,\
         foreignobject,g,glyph,image,line,marker,mask,missing-glyph,path,pattern,\
         polygon,polyline,rect,switch,symbol,text,textpath,tspan,use,view",
        true,
    )
});

static BUILT_IN_TAGS: LazyLock<TagSet> = LazyLock::new(|| TagSet::new("slot,component", false));

/// Elements that terminate an open `<p>` when they appear inside it.
static NON_PHRASING_TAGS: LazyLock<TagSet> = LazyLock::new(|| {
    TagSet::new(
        "address,article,aside,base,blockquote,body,caption,col,colgroup,dd,\
         details,dialog,div,dl,dt,fieldset,figcaption,figure,footer,form,\
         h1,h2,h3,h4,h5,h6,head,header,hgroup,hr,html,legend,li,menuitem,meta,\
         optgroup,option,param,rp,rt,source,style,summary,tbody,td,tfoot,th,thead,\
         title,tr,track",
        true,
    )
});

/// Void elements that never take a closing tag.
static UNARY_TAGS: LazyLock<TagSet> = LazyLock::new(|| {
    TagSet::new(
        "area,base,br,col,embed,frame,hr,img,input,isindex,keygen,\
         link,meta,param,source,track,wbr",
        true,
    )
});

/// Elements whose start tag may be left open and is closed by a sibling.
static LEFT_OPEN_TAGS: LazyLock<TagSet> = LazyLock::new(|| {
    TagSet::new(
        "colgroup,dd,dt,li,options,p,td,tfoot,th,thead,tr,source",
        true,
    )
});

/// Elements whose content is raw text rather than markup.
static PLAIN_TEXT_TAGS: LazyLock<TagSet> =
    LazyLock::new(|| TagSet::new("script,style,textarea", false));

pub fn is_html_tag(tag: &str) -> bool {
    HTML_TAGS.contains(tag)
}

pub fn is_svg_tag(tag: &str) -> bool {
    SVG_TAGS.contains(tag)
}

/// A platform tag the renderer owns; anything else resolves as a component.
pub fn is_reserved_tag(tag: &str) -> bool {
    HTML_TAGS.contains(tag) || SVG_TAGS.contains(tag)
}

/// `slot` and `component`, the runtime's own abstract elements.
pub fn is_built_in_tag(tag: &str) -> bool {
    BUILT_IN_TAGS.contains(tag)
}

pub fn is_non_phrasing_tag(tag: &str) -> bool {
    NON_PHRASING_TAGS.contains(tag)
}

pub fn is_unary_tag(tag: &str) -> bool {
    UNARY_TAGS.contains(tag)
}

pub fn can_be_left_open_tag(tag: &str) -> bool {
    LEFT_OPEN_TAGS.contains(tag)
}

pub fn is_plain_text_element(tag: &str) -> bool {
    PLAIN_TEXT_TAGS.contains(tag)
}

/// Leading newline inside these elements is ignored by the HTML spec.
pub fn is_ignore_newline_tag(tag: &str) -> bool {
    tag == "pre" || tag == "textarea"
}

/// The Unicode letter ranges legal in an element or attribute name,
/// per the HTML5 potential-custom-element-name grammar.
pub const UNICODE_LETTERS: &str = "a-zA-Z\u{00B7}\u{00C0}-\u{00D6}\u{00D8}-\u{00F6}\
\u{00F8}-\u{037D}\u{037F}-\u{1FFF}\u{200C}-\u{200D}\u{203F}-\u{2040}\u{2070}-\u{218F}\
\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}";

static COMPONENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^[a-zA-Z][\\-\\.0-9_{UNICODE_LETTERS}]*$")).unwrap()
});

/// Validate a component name for registration: HTML5 custom-element grammar,
/// and neither a built-in nor a platform-reserved tag.
pub fn validate_component_name(name: &str) -> Result<(), String> {
    if !COMPONENT_NAME.is_match(name) {
        return Err(format!(
            "Invalid component name: \"{name}\". Component names \
             should conform to valid custom element name in html5 specification."
        ));
    }
    if is_built_in_tag(name) || is_reserved_tag(name) {
        return Err(format!(
            "Do not use built-in or reserved HTML elements as component id: {name}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_classes() {
        assert!(is_reserved_tag("div"));
        assert!(is_reserved_tag("DIV"));
        assert!(is_reserved_tag("svg"));
        assert!(!is_reserved_tag("my-widget"));
        assert!(is_built_in_tag("slot"));
        assert!(is_built_in_tag("component"));
        assert!(is_unary_tag("br"));
        assert!(!is_unary_tag("span"));
        assert!(is_non_phrasing_tag("div"));
        assert!(!is_non_phrasing_tag("span"));
        assert!(can_be_left_open_tag("li"));
        assert!(is_plain_text_element("textarea"));
        assert!(!is_plain_text_element("pre"));
    }

    #[test]
    fn test_validate_component_name() {
        assert!(validate_component_name("my-widget").is_ok());
        assert!(validate_component_name("MyWidget").is_ok());
        assert!(validate_component_name("3d-view").is_err());
        assert!(validate_component_name("div").is_err());
        assert!(validate_component_name("slot").is_err());
    }
}

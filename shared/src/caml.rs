//! CAML filters for the `ContainerData` list.

use std::fmt;

/// Exact-match filter on one of the two lookup fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    ByContainerNumber(String),
    ByCompanyCode(String),
}

impl Filter {
    /// Pick a filter from the optional query parameters.
    ///
    /// `containerNumber` wins when both are given; empty values count as absent.
    pub fn from_params(container_number: Option<&str>, company_code: Option<&str>) -> Option<Self> {
        let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(String::from);

        present(container_number)
            .map(Filter::ByContainerNumber)
            .or_else(|| present(company_code).map(Filter::ByCompanyCode))
    }

    /// Internal name of the list field this filter targets.
    pub fn field_name(&self) -> &'static str {
        match self {
            Filter::ByContainerNumber(_) => "ContainerNumber",
            Filter::ByCompanyCode(_) => "CompanyCode",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Filter::ByContainerNumber(v) | Filter::ByCompanyCode(v) => v,
        }
    }

    /// Render the `<View>` element passed to `GetItems`.
    pub fn to_view_xml(&self) -> String {
        format!(
            "<View><Query><Where><Eq><FieldRef Name='{}'/><Value Type='Text'>{}</Value></Eq></Where></Query></View>",
            self.field_name(),
            XmlText(self.value())
        )
    }
}

/// Writes text with XML markup characters escaped.
struct XmlText<'a>(&'a str);

impl fmt::Display for XmlText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '\'' => f.write_str("&apos;")?,
                '"' => f.write_str("&quot;")?,
                c => fmt::Write::write_char(f, c)?,
            }
        }
        Ok(())
    }
}

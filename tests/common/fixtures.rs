//! MARCXML fixtures and identifier table generators

/// MARCXML record with a title and any number of subject headings
pub fn marcxml(ocn: &str, title: &str, subjects: &[&str]) -> String {
    let subjects: String = subjects
        .iter()
        .map(|s| {
            format!(
                r#"
  <datafield tag="650" ind1=" " ind2="0">
    <subfield code="a">{s}</subfield>
  </datafield>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<record xmlns="http://www.loc.gov/MARC21/slim">
  <leader>00000cam a2200000 i 4500</leader>
  <controlfield tag="001">{ocn}</controlfield>
  <controlfield tag="003">OCoLC</controlfield>
  <datafield tag="245" ind1="1" ind2="0">
    <subfield code="a">{title}</subfield>
  </datafield>{subjects}
</record>"#
    )
}

/// Semicolon-separated table with the default identifier header
pub fn identifier_table(ocns: &[String]) -> String {
    let mut table = String::from("Title;OCLC Number\n");
    for (i, ocn) in ocns.iter().enumerate() {
        table.push_str(&format!("Book {};(OCoLC){}\n", i + 1, ocn));
    }
    table
}

/// `"1"` to `"n"`
pub fn numbered(n: usize) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

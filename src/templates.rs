//! The transfer confirmation template.
//!
//! Placeholders take the form `{{key}}` where `key` is a field's camelCase
//! key. Values are HTML-escaped on substitution.

use crate::dom::escape_html;
use crate::fields::{FieldName, FieldSet};

/// Confirmation surface markup. The root carries the source width in its
/// inline style so clones and live surface agree on geometry.
const CONFIRMATION_TEMPLATE: &str = r##"
<div id="confirmation" class="bg-white flex flex-col" style="width: {{sourceWidth}}px">
    <div class="flex flex-col items-center px-6 pt-8 pb-6" style="background-color: #006a4e">
        <div class="flex items-center justify-center rounded-full bg-white w-12 h-12 mb-3">
            <p class="text-2xl font-bold" style="color: #006a4e; margin-bottom: 0px">✓</p>
        </div>
        <p class="text-lg font-bold text-white text-center mb-1">Transfer Successful</p>
        <p class="text-sm text-white text-center" style="margin-bottom: 0px">Funds Transfer</p>
    </div>

    <div class="flex flex-col items-center px-6 pt-6 pb-4">
        <p class="text-xs uppercase text-gray-500 mb-1">Amount</p>
        <h1 class="text-3xl text-gray-900" style="margin-top: 0px; margin-bottom: 0px">PKR {{amount}}</h1>
    </div>

    <div class="mx-6 rounded-lg border border-gray-200 px-4 py-2 flex flex-col">
        {{rows}}
    </div>

    <div class="flex flex-col items-center px-6 pt-4 pb-6">
        <p class="text-xs text-gray-400 text-center mb-1">Transaction ID {{transactionId}}</p>
        <p class="text-xs text-gray-400 text-center" style="margin-bottom: 0px">This is a system generated confirmation and does not require a signature.</p>
    </div>
</div>
"##;

/// Fields listed in the detail card, in order. Amount and transaction id
/// are rendered in the header and footer instead.
const DETAIL_ROWS: [FieldName; 7] = [
    FieldName::DateTime,
    FieldName::FromAccount,
    FieldName::BeneficiaryName,
    FieldName::BeneficiaryAccount,
    FieldName::Purpose,
    FieldName::Comments,
    FieldName::Channel,
];

fn detail_row(name: FieldName, value: &str, last: bool) -> String {
    let divider = if last {
        ""
    } else {
        r#"<hr style="margin-top: 0px; margin-bottom: 0px">"#
    };
    format!(
        r#"<div class="flex justify-between items-start gap-4 py-2">
            <p class="text-sm text-gray-500" style="margin-bottom: 0px">{label}</p>
            <p class="text-sm font-bold text-gray-900 text-right" style="margin-bottom: 0px">{value}</p>
        </div>{divider}"#,
        label = escape_html(name.label()),
        value = escape_html(value),
    )
}

/// Substitute every `{{key}}` placeholder. Unknown placeholders are left
/// untouched.
fn substitute(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the confirmation markup for `fields` at `source_width` logical px.
pub fn render_confirmation(fields: &FieldSet, source_width: f32) -> String {
    let rows: String = DETAIL_ROWS
        .iter()
        .enumerate()
        .map(|(i, &name)| detail_row(name, fields.get(name), i + 1 == DETAIL_ROWS.len()))
        .collect();

    substitute(CONFIRMATION_TEMPLATE, |key| match key {
        "sourceWidth" => Some(format!("{source_width}")),
        "rows" => Some(rows.clone()),
        other => FieldName::from_key(other).map(|name| escape_html(fields.get(name))),
    })
}

//! Parsing of `#[relmodel(...)]` attributes.
//!
//! Produces an [`EntityInput`] describing every field of the deriving struct:
//! plain columns, embedded sub-structures, ignored fields and relationships.

use proc_macro2::Span;
use quote::ToTokens;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Result, Type,
};

/// Parsed container and fields of a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityInput {
    /// The struct name.
    pub name: Ident,
    /// Table name (explicit or derived).
    pub table: String,
    /// Parsed fields in declaration order.
    pub fields: Vec<FieldDef>,
    /// Generics from the struct.
    pub generics: syn::Generics,
}

/// What a field maps to.
#[derive(Debug)]
pub enum FieldRole {
    /// A column.
    Column(ColumnDef),
    /// A flattened embedded sub-structure.
    Embedded,
    /// No column.
    Ignored,
    /// A relationship to another entity.
    Relation(RelationDef),
}

/// A parsed field.
#[derive(Debug)]
pub struct FieldDef {
    /// The field identifier.
    pub ident: Ident,
    /// The field type.
    pub ty: Type,
    /// Its role.
    pub role: FieldRole,
}

/// Column options.
#[derive(Debug, Default)]
pub struct ColumnDef {
    pub column: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub create_only: bool,
    pub update_only: bool,
    pub auto_create_time: Option<String>,
    pub auto_update_time: Option<String>,
    pub soft_delete: bool,
}

/// How a relation is held on the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// `Option<T>`
    Option,
    /// `Option<Box<T>>`
    OptionBox,
    /// `Vec<T>`
    Vec,
}

/// Relationship options.
#[derive(Debug)]
pub struct RelationDef {
    pub kind: &'static str,
    pub target: Type,
    pub holder: Holder,
    pub foreign_key: Option<String>,
    pub references: Option<String>,
    pub join_table: Option<String>,
    pub join_foreign_key: Option<String>,
    pub join_references: Option<String>,
}

/// Raw attribute values collected before the role is decided.
#[derive(Default)]
struct RawFieldAttrs {
    column: Option<LitStr>,
    primary_key: bool,
    auto_increment: bool,
    create_only: bool,
    update_only: bool,
    auto_create_time: Option<String>,
    auto_update_time: Option<String>,
    soft_delete: bool,
    ignore: bool,
    embedded: bool,
    kind: Option<(&'static str, Span)>,
    join_table: Option<String>,
    foreign_key: Option<LitStr>,
    references: Option<LitStr>,
    join_foreign_key: Option<LitStr>,
    join_references: Option<LitStr>,
}

/// Parse a `DeriveInput` into an `EntityInput`.
pub fn parse_entity(input: &DeriveInput) -> Result<EntityInput> {
    let name = input.ident.clone();
    let generics = input.generics.clone();

    let table = match parse_container_table(&input.attrs)? {
        Some(table) => table,
        None => default_table_name(&name.to_string()),
    };

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    Ok(EntityInput {
        name,
        table,
        fields,
        generics,
    })
}

fn parse_container_table(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table = None;
    for attr in attrs {
        if !attr.path().is_ident("relmodel") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                check_identifier(&lit)?;
                table = Some(lit.value());
                Ok(())
            } else {
                let attr_name = meta.path.to_token_stream().to_string();
                Err(meta.error(format!(
                    "unknown relmodel container attribute `{attr_name}`. Valid attributes are: table"
                )))
            }
        })?;
    }
    Ok(table)
}

/// Parse all fields from a struct.
pub fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new_spanned(
            fields,
            "Entity requires a struct with named fields",
        )),
        Fields::Unit => Ok(Vec::new()),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let ty = field.ty.clone();
    let raw = parse_field_attrs(&field.attrs)?;

    let role = if raw.ignore {
        FieldRole::Ignored
    } else if raw.embedded {
        if raw.kind.is_some() || raw.column.is_some() || raw.primary_key {
            return Err(Error::new_spanned(
                field,
                "`embedded` cannot be combined with column or relationship attributes",
            ));
        }
        FieldRole::Embedded
    } else if let Some((kind, span)) = raw.kind {
        let (holder, target) = relation_holder(&ty).ok_or_else(|| {
            Error::new(
                span,
                "relationship fields must be `Option<T>`, `Option<Box<T>>` or `Vec<T>`",
            )
        })?;
        let many = matches!(kind, "has_many" | "many_to_many");
        if many != (holder == Holder::Vec) {
            return Err(Error::new(
                span,
                format!(
                    "`{kind}` relationships must be held in {}",
                    if many { "a `Vec<T>`" } else { "an `Option<T>` or `Option<Box<T>>`" }
                ),
            ));
        }
        FieldRole::Relation(RelationDef {
            kind,
            target,
            holder,
            foreign_key: raw.foreign_key.map(|l| l.value()),
            references: raw.references.map(|l| l.value()),
            join_table: raw.join_table,
            join_foreign_key: raw.join_foreign_key.map(|l| l.value()),
            join_references: raw.join_references.map(|l| l.value()),
        })
    } else {
        if raw.foreign_key.is_some() || raw.references.is_some() {
            return Err(Error::new_spanned(
                field,
                "`foreign_key`/`references` need a relationship kind \
                 (belongs_to, has_one, has_many or many_to_many)",
            ));
        }
        if raw.create_only && raw.update_only {
            return Err(Error::new_spanned(
                field,
                "a column cannot be both `create_only` and `update_only`",
            ));
        }
        FieldRole::Column(ColumnDef {
            column: raw.column.map_or_else(|| ident.to_string(), |l| l.value()),
            primary_key: raw.primary_key,
            auto_increment: raw.auto_increment,
            nullable: is_option_type(&ty),
            create_only: raw.create_only,
            update_only: raw.update_only,
            auto_create_time: raw.auto_create_time,
            auto_update_time: raw.auto_update_time,
            soft_delete: raw.soft_delete,
        })
    };

    Ok(FieldDef { ident, ty, role })
}

fn parse_field_attrs(attrs: &[Attribute]) -> Result<RawFieldAttrs> {
    let mut raw = RawFieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("relmodel") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("primary_key") {
                raw.primary_key = true;
            } else if path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                check_identifier(&lit)?;
                raw.column = Some(lit);
            } else if path.is_ident("auto_increment") {
                raw.auto_increment = true;
            } else if path.is_ident("create_only") {
                raw.create_only = true;
            } else if path.is_ident("update_only") {
                raw.update_only = true;
            } else if path.is_ident("auto_create_time") {
                raw.auto_create_time = Some(parse_time_format(&meta)?);
            } else if path.is_ident("auto_update_time") {
                raw.auto_update_time = Some(parse_time_format(&meta)?);
            } else if path.is_ident("soft_delete") {
                raw.soft_delete = true;
            } else if path.is_ident("ignore") {
                raw.ignore = true;
            } else if path.is_ident("embedded") {
                raw.embedded = true;
            } else if path.is_ident("belongs_to") {
                set_kind(&mut raw.kind, &meta, "belongs_to")?;
            } else if path.is_ident("has_one") {
                set_kind(&mut raw.kind, &meta, "has_one")?;
            } else if path.is_ident("has_many") {
                set_kind(&mut raw.kind, &meta, "has_many")?;
            } else if path.is_ident("many_to_many") {
                set_kind(&mut raw.kind, &meta, "many_to_many")?;
                let lit: LitStr = meta.value()?.parse()?;
                check_identifier(&lit)?;
                raw.join_table = Some(lit.value());
            } else if path.is_ident("foreign_key") {
                raw.foreign_key = Some(parse_ident_value(&meta)?);
            } else if path.is_ident("references") {
                raw.references = Some(parse_ident_value(&meta)?);
            } else if path.is_ident("join_foreign_key") {
                raw.join_foreign_key = Some(parse_ident_value(&meta)?);
            } else if path.is_ident("join_references") {
                raw.join_references = Some(parse_ident_value(&meta)?);
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown relmodel attribute `{attr_name}`. \
                     Valid attributes are: primary_key, column, auto_increment, create_only, \
                     update_only, auto_create_time, auto_update_time, soft_delete, ignore, \
                     embedded, belongs_to, has_one, has_many, many_to_many, foreign_key, \
                     references, join_foreign_key, join_references"
                )));
            }
            Ok(())
        })?;
    }
    Ok(raw)
}

fn set_kind(
    slot: &mut Option<(&'static str, Span)>,
    meta: &syn::meta::ParseNestedMeta<'_>,
    kind: &'static str,
) -> Result<()> {
    if slot.is_some() {
        return Err(meta.error("only one relationship kind per field"));
    }
    let span = meta.path.get_ident().map_or_else(Span::call_site, Ident::span);
    *slot = Some((kind, span));
    Ok(())
}

fn parse_ident_value(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<LitStr> {
    let lit: LitStr = meta.value()?.parse()?;
    check_identifier(&lit)?;
    Ok(lit)
}

fn parse_time_format(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<String> {
    if !meta.input.peek(syn::Token![=]) {
        return Ok(String::new());
    }
    let lit: LitStr = meta.value()?.parse()?;
    let value = lit.value();
    match value.as_str() {
        "" | "timestamp" | "unix" | "second" | "seconds" | "milli" | "millis" => Ok(value),
        _ => Err(Error::new_spanned(
            lit,
            "expected \"milli\" or \"unix\" as the timestamp format",
        )),
    }
}

fn check_identifier(lit: &LitStr) -> Result<()> {
    let re = regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .map_err(|e| Error::new_spanned(lit, format!("identifier pattern: {e}")))?;
    if re.is_match(&lit.value()) {
        Ok(())
    } else {
        Err(Error::new_spanned(
            lit,
            format!("`{}` is not a valid SQL identifier", lit.value()),
        ))
    }
}

/// Check if a type is `Option<T>`.
pub fn is_option_type(ty: &Type) -> bool {
    single_generic(ty, "Option").is_some()
}

/// The inner type of `Wrapper<T>` when `ty` is that wrapper.
fn single_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) => Some(inner),
        _ => None,
    }
}

/// Classify a relationship field type.
fn relation_holder(ty: &Type) -> Option<(Holder, Type)> {
    if let Some(inner) = single_generic(ty, "Vec") {
        return Some((Holder::Vec, inner.clone()));
    }
    let inner = single_generic(ty, "Option")?;
    if let Some(boxed) = single_generic(inner, "Box") {
        return Some((Holder::OptionBox, boxed.clone()));
    }
    Some((Holder::Option, inner.clone()))
}

/// snake_case plural of a type name; mirrors `relmodel_core::default_table_name`.
pub fn default_table_name(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut snake = String::with_capacity(type_name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !snake.ends_with('_') {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| snake.ends_with(s)) {
        return format!("{snake}es");
    }
    if snake.ends_with('y') && snake.chars().rev().nth(1).is_some_and(|c| !"aeiou".contains(c)) {
        snake.pop();
        return format!("{snake}ies");
    }
    format!("{snake}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_is_option_type() {
        let ty: Type = parse_quote!(Option<String>);
        assert!(is_option_type(&ty));

        let ty: Type = parse_quote!(String);
        assert!(!is_option_type(&ty));
    }

    #[test]
    fn test_relation_holder() {
        let ty: Type = parse_quote!(Option<Box<User>>);
        assert_eq!(relation_holder(&ty).unwrap().0, Holder::OptionBox);
        let ty: Type = parse_quote!(Vec<Address>);
        assert_eq!(relation_holder(&ty).unwrap().0, Holder::Vec);
        let ty: Type = parse_quote!(i64);
        assert!(relation_holder(&ty).is_none());
    }

    #[test]
    fn test_default_table_name() {
        assert_eq!(default_table_name("User"), "users");
        assert_eq!(default_table_name("OrderDetail"), "order_details");
        assert_eq!(default_table_name("Address"), "addresses");
        assert_eq!(default_table_name("Category"), "categories");
    }

    #[test]
    fn test_parse_entity_roles() {
        let input: DeriveInput = parse_quote! {
            #[relmodel(table = "users")]
            struct User {
                #[relmodel(primary_key, create_only)]
                id: String,
                #[relmodel(embedded)]
                name: Name,
                #[relmodel(ignore)]
                information: String,
                #[relmodel(auto_create_time = "milli")]
                created_at: i64,
                #[relmodel(has_many, foreign_key = "user_id")]
                addresses: Vec<Address>,
                deleted_at: Option<String>,
            }
        };
        let parsed = parse_entity(&input).unwrap();
        assert_eq!(parsed.table, "users");
        assert!(matches!(parsed.fields[0].role, FieldRole::Column(ref c) if c.primary_key && c.create_only));
        assert!(matches!(parsed.fields[1].role, FieldRole::Embedded));
        assert!(matches!(parsed.fields[2].role, FieldRole::Ignored));
        assert!(matches!(parsed.fields[3].role, FieldRole::Column(ref c) if c.auto_create_time.as_deref() == Some("milli")));
        assert!(matches!(parsed.fields[4].role, FieldRole::Relation(ref r) if r.kind == "has_many"));
        assert!(matches!(parsed.fields[5].role, FieldRole::Column(ref c) if c.nullable));
    }

    #[test]
    fn test_rejects_many_in_option() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[relmodel(has_many)]
                addresses: Option<Address>,
            }
        };
        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn test_rejects_unknown_attribute() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[relmodel(primary)]
                id: String,
            }
        };
        let err = parse_entity(&input).unwrap_err();
        assert!(err.to_string().contains("unknown relmodel attribute"));
    }
}

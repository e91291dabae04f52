//! Code generation for `#[derive(Entity)]` and `#[derive(FromRecord)]`.

use proc_macro2::TokenStream;
use quote::quote;

use crate::parse::{ColumnDef, EntityInput, FieldDef, FieldRole, Holder, RelationDef};

/// Generate `Entity` and `FromRecord` implementations.
pub fn generate_entity_impl(def: &EntityInput) -> TokenStream {
    let name = &def.name;
    let name_str = name.to_string();
    let table = &def.table;
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();

    let definition_parts = def.fields.iter().map(definition_part);
    let to_record_parts = def.fields.iter().map(to_record_part);
    let apply_parts = def.fields.iter().map(apply_part);
    let from_record = generate_from_record_impl(def);

    quote! {
        impl #impl_generics ::relmodel_core::Entity for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;

            fn definition() -> ::relmodel_core::EntityDef {
                ::relmodel_core::EntityDef::new(#name_str, #table)
                    #(#definition_parts)*
            }

            fn to_record(&self) -> ::relmodel_core::Record {
                let mut record = ::relmodel_core::Record::new();
                #(#to_record_parts)*
                record
            }

            fn apply_record(
                &mut self,
                record: &::relmodel_core::Record,
            ) -> ::relmodel_core::Result<()> {
                #(#apply_parts)*
                Ok(())
            }
        }

        #from_record
    }
}

/// Generate only the `FromRecord` implementation (for result shapes).
pub fn generate_from_record_impl(def: &EntityInput) -> TokenStream {
    let name = &def.name;
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();
    let inits = def.fields.iter().map(from_record_init);

    quote! {
        impl #impl_generics ::relmodel_core::FromRecord for #name #ty_generics #where_clause {
            fn from_record(
                record: &::relmodel_core::Record,
            ) -> ::relmodel_core::Result<Self> {
                Ok(Self {
                    #(#inits,)*
                })
            }
        }
    }
}

fn time_format_tokens(format: Option<&String>) -> TokenStream {
    match format.map(String::as_str) {
        None => quote!(None),
        Some("unix" | "second" | "seconds") => {
            quote!(Some(::relmodel_core::TimeFormat::UnixSeconds))
        }
        Some("milli" | "millis") => quote!(Some(::relmodel_core::TimeFormat::UnixMillis)),
        Some(_) => quote!(Some(::relmodel_core::TimeFormat::Timestamp)),
    }
}

fn column_info(field: &FieldDef, col: &ColumnDef) -> TokenStream {
    let field_name = field.ident.to_string();
    let column = &col.column;
    let primary_key = col.primary_key;
    let auto_increment = col.auto_increment;
    let nullable = col.nullable;
    let soft_delete = col.soft_delete;
    let permission = if col.create_only {
        quote!(::relmodel_core::FieldPermission::CreateOnly)
    } else if col.update_only {
        quote!(::relmodel_core::FieldPermission::UpdateOnly)
    } else {
        quote!(::relmodel_core::FieldPermission::ReadWrite)
    };
    let create_time = time_format_tokens(col.auto_create_time.as_ref());
    let update_time = time_format_tokens(col.auto_update_time.as_ref());

    quote! {
        ::relmodel_core::FieldInfo::new(#field_name, #column)
            .primary_key(#primary_key)
            .auto_increment(#auto_increment)
            .nullable(#nullable)
            .permission(#permission)
            .auto_create_time(#create_time)
            .auto_update_time(#update_time)
            .soft_delete(#soft_delete)
    }
}

fn relationship_info(field: &FieldDef, rel: &RelationDef) -> TokenStream {
    let field_name = field.ident.to_string();
    let target = &rel.target;
    let kind = match rel.kind {
        "belongs_to" => quote!(::relmodel_core::RelationshipKind::BelongsTo),
        "has_one" => quote!(::relmodel_core::RelationshipKind::HasOne),
        "has_many" => quote!(::relmodel_core::RelationshipKind::HasMany),
        _ => quote!(::relmodel_core::RelationshipKind::ManyToMany),
    };
    let foreign_key = rel.foreign_key.as_ref().map(|fk| quote!(.foreign_key(#fk)));
    let references = rel.references.as_ref().map(|r| quote!(.references(#r)));
    let link_table = rel.join_table.as_ref().map(|table| {
        let jfk = rel
            .join_foreign_key
            .as_ref()
            .map(|c| quote!(.join_foreign_key(#c)));
        let jref = rel
            .join_references
            .as_ref()
            .map(|c| quote!(.join_references(#c)));
        quote! {
            .link_table(::relmodel_core::LinkTableInfo::new(#table) #jfk #jref)
        }
    });

    quote! {
        ::relmodel_core::RelationshipInfo::new(
            #field_name,
            <#target as ::relmodel_core::Entity>::NAME,
            #kind,
        )
        #foreign_key
        #references
        #link_table
    }
}

fn definition_part(field: &FieldDef) -> TokenStream {
    let field_name = field.ident.to_string();
    let ty = &field.ty;
    match &field.role {
        FieldRole::Column(col) => {
            let info = column_info(field, col);
            quote!(.field(#info))
        }
        FieldRole::Embedded => quote! {
            .embed(#field_name, <#ty as ::relmodel_core::Entity>::definition())
        },
        FieldRole::Ignored => quote!(.ignore(#field_name)),
        FieldRole::Relation(rel) => {
            let info = relationship_info(field, rel);
            quote!(.relationship(#info))
        }
    }
}

fn to_record_part(field: &FieldDef) -> TokenStream {
    let ident = &field.ident;
    let field_name = ident.to_string();
    match &field.role {
        FieldRole::Column(col) => {
            let column = &col.column;
            quote! {
                record.set(#column, ::relmodel_core::ToValue::to_value(&self.#ident));
            }
        }
        FieldRole::Embedded => quote! {
            record.merge_values(::relmodel_core::Entity::to_record(&self.#ident).values);
        },
        FieldRole::Ignored => quote!(),
        FieldRole::Relation(rel) => {
            let target = &rel.target;
            match rel.holder {
                Holder::Option | Holder::OptionBox => quote! {
                    if let Some(related) = &self.#ident {
                        record.set_relation(
                            #field_name,
                            vec![<#target as ::relmodel_core::Entity>::to_record(related)],
                        );
                    }
                },
                Holder::Vec => quote! {
                    if !self.#ident.is_empty() {
                        record.set_relation(
                            #field_name,
                            self.#ident
                                .iter()
                                .map(<#target as ::relmodel_core::Entity>::to_record)
                                .collect(),
                        );
                    }
                },
            }
        }
    }
}

fn relation_value(field: &FieldDef, rel: &RelationDef) -> TokenStream {
    let target = &rel.target;
    let field_name = field.ident.to_string();
    match rel.holder {
        Holder::Option => quote! {
            match record.relation(#field_name).and_then(|r| r.first()) {
                Some(r) => Some(<#target as ::relmodel_core::FromRecord>::from_record(r)?),
                None => None,
            }
        },
        Holder::OptionBox => quote! {
            match record.relation(#field_name).and_then(|r| r.first()) {
                Some(r) => Some(Box::new(<#target as ::relmodel_core::FromRecord>::from_record(r)?)),
                None => None,
            }
        },
        Holder::Vec => quote! {
            match record.relation(#field_name) {
                Some(rows) => rows
                    .iter()
                    .map(<#target as ::relmodel_core::FromRecord>::from_record)
                    .collect::<::relmodel_core::Result<Vec<_>>>()?,
                None => Vec::new(),
            }
        },
    }
}

fn apply_part(field: &FieldDef) -> TokenStream {
    let ident = &field.ident;
    let field_name = ident.to_string();
    match &field.role {
        FieldRole::Column(col) => {
            let column = &col.column;
            quote! {
                if record.values.contains(#column) {
                    self.#ident = record.get_named(#column)?;
                }
            }
        }
        FieldRole::Embedded => quote! {
            ::relmodel_core::Entity::apply_record(&mut self.#ident, record)?;
        },
        FieldRole::Ignored => quote!(),
        FieldRole::Relation(rel) => {
            let value = relation_value(field, rel);
            quote! {
                if record.relation(#field_name).is_some() {
                    self.#ident = #value;
                }
            }
        }
    }
}

fn from_record_init(field: &FieldDef) -> TokenStream {
    let ident = &field.ident;
    let ty = &field.ty;
    match &field.role {
        FieldRole::Column(col) => {
            let column = &col.column;
            quote!(#ident: record.get_or_default(#column)?)
        }
        FieldRole::Embedded => {
            quote!(#ident: <#ty as ::relmodel_core::FromRecord>::from_record(record)?)
        }
        FieldRole::Ignored => quote!(#ident: ::std::default::Default::default()),
        FieldRole::Relation(rel) => {
            let value = relation_value(field, rel);
            quote!(#ident: #value)
        }
    }
}

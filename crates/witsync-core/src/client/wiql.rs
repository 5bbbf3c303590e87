//! WIQL rendering for [`WorkItemQuery`].

use std::fmt::Write as _;

use super::WorkItemQuery;
use crate::model::fields;

/// Quote a value as a WIQL string literal.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn type_list(types: &[String]) -> String {
    types
        .iter()
        .map(|t| quote(t))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a query as single-line WIQL scoped to `project`.
#[must_use]
pub fn render(query: &WorkItemQuery, project: &str) -> String {
    let mut wiql = format!(
        "SELECT [{}] FROM WorkItems WHERE [{}] = {}",
        fields::ID,
        fields::TEAM_PROJECT,
        quote(project)
    );

    match query {
        WorkItemQuery::Roots {
            types,
            after_id,
            exclude,
        } => {
            let _ = write!(
                wiql,
                " AND [{}] IN ({})",
                fields::WORK_ITEM_TYPE,
                type_list(types)
            );
            if let Some(exclusion) = exclude {
                let _ = write!(wiql, " AND [{}] <> {}", exclusion.field, quote(&exclusion.value));
            }
            let _ = write!(
                wiql,
                " AND [{id}] > {after_id} ORDER BY [{id}] ASC",
                id = fields::ID
            );
        }
        WorkItemQuery::FieldEquals { field, value } => {
            let _ = write!(wiql, " AND [{field}] = {}", quote(value));
        }
        WorkItemQuery::All { after_id } => {
            let _ = write!(
                wiql,
                " AND [{id}] > {after_id} ORDER BY [{id}] ASC",
                id = fields::ID
            );
        }
        WorkItemQuery::RecentlyCreated { types } => {
            let _ = write!(
                wiql,
                " AND [{}] IN ({}) ORDER BY [{}] DESC",
                fields::WORK_ITEM_TYPE,
                type_list(types),
                fields::CREATED_DATE
            );
        }
    }

    wiql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Exclusion;

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(quote("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn roots_query_pages_by_id() {
        let query = WorkItemQuery::Roots {
            types: vec!["Work Bundle".to_string(), "WorkBundle".to_string()],
            after_id: 120,
            exclude: Some(Exclusion {
                field: "Custom.OwnerOrg".to_string(),
                value: "Contoso".to_string(),
            }),
        };
        assert_eq!(
            render(&query, "SrcProj"),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'SrcProj' \
             AND [System.WorkItemType] IN ('Work Bundle','WorkBundle') \
             AND [Custom.OwnerOrg] <> 'Contoso' \
             AND [System.Id] > 120 ORDER BY [System.Id] ASC"
        );
    }

    #[test]
    fn correlation_lookup_compares_as_string() {
        let query = WorkItemQuery::FieldEquals {
            field: "Custom.ReflectedWorkItemId".to_string(),
            value: "100".to_string(),
        };
        assert_eq!(
            render(&query, "TgtProj"),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'TgtProj' \
             AND [Custom.ReflectedWorkItemId] = '100'"
        );
    }

    #[test]
    fn all_items_query_pages_by_id() {
        assert_eq!(
            render(&WorkItemQuery::All { after_id: 5200 }, "TgtProj"),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'TgtProj' \
             AND [System.Id] > 5200 ORDER BY [System.Id] ASC"
        );
    }

    #[test]
    fn recent_query_orders_by_creation() {
        let query = WorkItemQuery::RecentlyCreated {
            types: vec!["Work Bundle".to_string()],
        };
        assert!(render(&query, "P").ends_with("ORDER BY [System.CreatedDate] DESC"));
    }
}

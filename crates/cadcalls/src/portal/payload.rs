//! Request parameters and the CAD calls wire payload.

use serde::Serialize;

use crate::config::DefaultsSection;

/// Paging and filter values for one API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    pub agency_id: u32,
    pub include_open: bool,
    pub include_closed: bool,
    /// Page size, always at least 1.
    pub take: u32,
    pub skip: u32,
    pub search_text: String,
}

impl RequestParams {
    /// Parameters taken entirely from configured defaults.
    pub fn from_defaults(agency_id: u32, defaults: &DefaultsSection) -> Self {
        Self {
            agency_id,
            include_open: defaults.include_open,
            include_closed: defaults.include_closed,
            take: defaults.take.max(1),
            skip: defaults.skip,
            search_text: defaults.search_text.clone(),
        }
    }

    /// POST body for these parameters.
    pub fn payload(&self) -> CadCallsPayload {
        CadCallsPayload {
            include_open_calls: self.include_open,
            include_closed_calls: self.include_closed,
            include_count: true,
            paging_options: PagingOptions {
                sort_options: vec![SortOption::start_time_descending()],
                take: self.take,
                skip: self.skip,
            },
            filter_options_parameters: FilterOptions {
                intersection_search: true,
                search_text: self.search_text.clone(),
                parameters: Vec::new(),
            },
        }
    }

    /// Query string pairs used when the API is called with GET.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("includeOpen", self.include_open.to_string()),
            ("includeClosed", self.include_closed.to_string()),
            ("take", self.take.to_string()),
            ("skip", self.skip.to_string()),
            ("searchText", self.search_text.clone()),
        ]
    }
}

/// JSON body accepted by `POST /api/CADCalls/{agency}`.
///
/// Field order matches what the portal's own front end sends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CadCallsPayload {
    include_open_calls: bool,
    include_closed_calls: bool,
    include_count: bool,
    paging_options: PagingOptions,
    filter_options_parameters: FilterOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PagingOptions {
    sort_options: Vec<SortOption>,
    take: u32,
    skip: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SortOption {
    name: &'static str,
    sort_direction: &'static str,
    sequence: u32,
}

impl SortOption {
    fn start_time_descending() -> Self {
        Self {
            name: "StartTime",
            sort_direction: "Descending",
            sequence: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FilterOptions {
    intersection_search: bool,
    search_text: String,
    // The portal answers 500 when this is populated, search text or not.
    parameters: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(take: u32, skip: u32, search: &str) -> RequestParams {
        RequestParams {
            agency_id: 386,
            include_open: true,
            include_closed: false,
            take,
            skip,
            search_text: search.to_string(),
        }
    }

    #[test]
    fn test_payload_wire_shape() {
        let value = serde_json::to_value(params(30, 0, "").payload()).unwrap();
        assert_eq!(
            value,
            json!({
                "IncludeOpenCalls": true,
                "IncludeClosedCalls": false,
                "IncludeCount": true,
                "PagingOptions": {
                    "SortOptions": [
                        { "Name": "StartTime", "SortDirection": "Descending", "Sequence": 1 }
                    ],
                    "Take": 30,
                    "Skip": 0
                },
                "FilterOptionsParameters": {
                    "IntersectionSearch": true,
                    "SearchText": "",
                    "Parameters": []
                }
            })
        );
    }

    #[test]
    fn test_payload_key_order() {
        let text = serde_json::to_string(&params(1, 0, "").payload()).unwrap();
        let open = text.find("IncludeOpenCalls").unwrap();
        let closed = text.find("IncludeClosedCalls").unwrap();
        let count = text.find("IncludeCount").unwrap();
        let paging = text.find("PagingOptions").unwrap();
        let filter = text.find("FilterOptionsParameters").unwrap();
        assert!(open < closed && closed < count && count < paging && paging < filter);
    }

    #[test]
    fn test_paging_and_sort_for_many_combinations() {
        for (take, skip) in [(1, 0), (30, 0), (100, 250), (u32::MAX, u32::MAX)] {
            let value = serde_json::to_value(params(take, skip, "x").payload()).unwrap();
            let paging = &value["PagingOptions"];
            assert_eq!(paging["Take"], json!(take));
            assert_eq!(paging["Skip"], json!(skip));
            let sorts = paging["SortOptions"].as_array().unwrap();
            assert_eq!(sorts.len(), 1);
            assert_eq!(sorts[0]["Name"], "StartTime");
            assert_eq!(sorts[0]["SortDirection"], "Descending");
        }
    }

    #[test]
    fn test_parameters_always_empty() {
        for search in ["", "BURGLARY", "  spaced out  ", "ünïcødé & <tags>"] {
            let value = serde_json::to_value(params(10, 0, search).payload()).unwrap();
            let filter = &value["FilterOptionsParameters"];
            assert_eq!(filter["Parameters"], json!([]));
            assert_eq!(filter["SearchText"], json!(search));
            assert_eq!(filter["IntersectionSearch"], json!(true));
        }
    }

    #[test]
    fn test_get_query_uses_lowercase_bools() {
        let mut p = params(25, 5, "theft");
        p.include_closed = true;
        let query = p.query();
        assert_eq!(
            query,
            vec![
                ("includeOpen", "true".to_string()),
                ("includeClosed", "true".to_string()),
                ("take", "25".to_string()),
                ("skip", "5".to_string()),
                ("searchText", "theft".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_defaults() {
        let defaults = DefaultsSection::default();
        let p = RequestParams::from_defaults(386, &defaults);
        assert_eq!(p.agency_id, 386);
        assert!(p.include_open);
        assert!(!p.include_closed);
        assert_eq!(p.take, 30);
        assert_eq!(p.skip, 0);
        assert!(p.search_text.is_empty());
    }
}

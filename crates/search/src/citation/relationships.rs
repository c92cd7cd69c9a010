//! Cross-references between revenue areas
//!
//! An undirected graph links categories whose liabilities interact, such as
//! transfer duty at purchase followed by annual land tax. Analysis reports
//! the areas within two hops of a primary category, with the warnings and
//! recommendations the links and the scenario imply.

use super::Citation;
use crate::classifier::QueryEntities;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use taxlex_common::config::CalculationConfig;
use taxlex_common::Category;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Complementary,
    Prerequisite,
    Alternative,
    Conflicting,
    Beneficial,
    Temporal,
}

impl RelationshipKind {
    /// Strength of the link, used to order related areas
    pub fn weight(self) -> f32 {
        match self {
            RelationshipKind::Complementary => 0.9,
            RelationshipKind::Prerequisite | RelationshipKind::Beneficial => 0.8,
            RelationshipKind::Alternative => 0.7,
            RelationshipKind::Temporal => 0.6,
            RelationshipKind::Conflicting => 0.5,
        }
    }
}

/// Links between revenue areas known to interact
pub const REVENUE_RELATIONSHIPS: &[(Category, Category, RelationshipKind)] = &[
    (Category::LandTax, Category::Duties, RelationshipKind::Complementary),
    (Category::Grants, Category::Duties, RelationshipKind::Beneficial),
];

const BASE_CONFIDENCE: f32 = 0.7;
const PER_RELATED_BONUS: f32 = 0.05;
const RELATED_BONUS_CAP: f32 = 0.2;
const CONTEXT_BONUS: f32 = 0.1;
const KNOWN_AREA_BONUS: f32 = 0.1;
const MAX_PATH_NODES: usize = 3;

/// Facts about the situation a question describes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScenarioContext {
    pub property_purchase: bool,
    pub property_value: Option<f64>,
    pub first_home_buyer: bool,
    pub business: bool,
    pub annual_payroll: Option<f64>,
}

impl ScenarioContext {
    /// Scenario implied by a question: a property purchase for duty and land
    /// tax questions, a business for payroll tax questions. The first dollar
    /// figure is taken as the property value or annual payroll.
    pub fn from_query(query: &str, category: Category, entities: &QueryEntities) -> Option<Self> {
        let query = query.to_lowercase();
        let value = entities.dollar_values.first().copied();
        let property_purchase = category == Category::Duties
            || (category == Category::LandTax && (query.contains("buy") || query.contains("purchase")));
        let business = category == Category::PayrollTax;

        if !property_purchase && !business {
            return None;
        }
        Some(Self {
            property_purchase,
            property_value: value.filter(|_| property_purchase),
            first_home_buyer: query.contains("first home"),
            business,
            annual_payroll: value.filter(|_| business),
        })
    }
}

/// Two cited acts whose areas are linked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationLink {
    pub from_act: String,
    pub to_act: String,
    pub relationship: RelationshipKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossReference {
    pub primary: Category,
    pub related: Vec<Category>,

    /// Shortest path from the primary area to each related area
    pub paths: Vec<Vec<Category>>,

    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f32,

    /// Links between acts cited together in the retrieved passages
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citation_links: Vec<CitationLink>,
}

pub struct RelationshipGraph {
    graph: UnGraph<Category, RelationshipKind>,
    nodes: HashMap<Category, NodeIndex>,
    payroll_threshold: f64,
    premium_property_threshold: f64,
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::from_config(&CalculationConfig::default())
    }
}

impl RelationshipGraph {
    /// Revenue links with thresholds taken from the rate schedules
    pub fn from_config(config: &CalculationConfig) -> Self {
        Self::new(
            REVENUE_RELATIONSHIPS,
            config.payroll_threshold,
            config.premium_property_threshold,
        )
    }

    pub fn new(
        relationships: &[(Category, Category, RelationshipKind)],
        payroll_threshold: f64,
        premium_property_threshold: f64,
    ) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes: HashMap<Category, NodeIndex> = HashMap::new();

        for &(a, b, kind) in relationships {
            let a = *nodes.entry(a).or_insert_with(|| graph.add_node(a));
            let b = *nodes.entry(b).or_insert_with(|| graph.add_node(b));
            graph.update_edge(a, b, kind);
        }

        Self {
            graph,
            nodes,
            payroll_threshold,
            premium_property_threshold,
        }
    }

    /// Direct link between two areas
    pub fn relationship(&self, a: Category, b: Category) -> Option<RelationshipKind> {
        let (a, b) = (*self.nodes.get(&a)?, *self.nodes.get(&b)?);
        self.graph
            .find_edge(a, b)
            .and_then(|edge| self.graph.edge_weight(edge))
            .copied()
    }

    fn neighbors(&self, idx: NodeIndex) -> BTreeSet<Category> {
        self.graph
            .neighbors(idx)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect()
    }

    /// Areas within two hops of `primary`, with warnings and recommendations.
    /// An area outside the graph gets zero confidence.
    pub fn analyze(&self, primary: Category, context: Option<&ScenarioContext>) -> CrossReference {
        let Some(&idx) = self.nodes.get(&primary) else {
            return CrossReference {
                primary,
                related: Vec::new(),
                paths: Vec::new(),
                warnings: vec![format!("No relationships found for {}", primary)],
                recommendations: Vec::new(),
                confidence: 0.0,
                citation_links: Vec::new(),
            };
        };

        let direct = self.neighbors(idx);
        let mut paths: Vec<Vec<Category>> = direct.iter().map(|&n| vec![primary, n]).collect();
        for &neighbor in &direct {
            let Some(&neighbor_idx) = self.nodes.get(&neighbor) else {
                continue;
            };
            for second in self.neighbors(neighbor_idx) {
                let known = second == primary || paths.iter().any(|p| p.last() == Some(&second));
                if !known {
                    paths.push(vec![primary, neighbor, second]);
                }
            }
        }
        paths.retain(|p| p.len() <= MAX_PATH_NODES);

        let mut related: Vec<Category> = paths.iter().filter_map(|p| p.last().copied()).collect();
        related.sort_by(|a, b| {
            let weight = |c: &Category| self.relationship(primary, *c).map_or(0.0, RelationshipKind::weight);
            weight(b)
                .partial_cmp(&weight(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });

        let warnings = self.warnings(primary, &related, context);
        let recommendations = self.recommendations(primary, &related, context);

        let mut confidence = BASE_CONFIDENCE
            + (related.len() as f32 * PER_RELATED_BONUS).min(RELATED_BONUS_CAP)
            + KNOWN_AREA_BONUS;
        if context.is_some() {
            confidence += CONTEXT_BONUS;
        }

        debug!(primary = %primary, related = related.len(), "Cross-reference analysis");
        CrossReference {
            primary,
            related,
            paths,
            warnings,
            recommendations,
            confidence: confidence.min(1.0),
            citation_links: Vec::new(),
        }
    }

    /// Analysis of `primary` plus the links between acts cited together
    pub fn analyze_citations(
        &self,
        primary: Category,
        citations: &[Citation],
        context: Option<&ScenarioContext>,
    ) -> CrossReference {
        let mut acts: Vec<(&str, Category)> = Vec::new();
        for citation in citations {
            let category = Category::infer_from_name(&citation.act_name);
            if category != Category::General
                && !acts.iter().any(|(act, _)| *act == citation.act_name)
            {
                acts.push((citation.act_name.as_str(), category));
            }
        }

        let mut citation_links = Vec::new();
        for (i, &(from_act, from)) in acts.iter().enumerate() {
            for &(to_act, to) in &acts[i + 1..] {
                if let Some(relationship) = self.relationship(from, to) {
                    citation_links.push(CitationLink {
                        from_act: from_act.to_string(),
                        to_act: to_act.to_string(),
                        relationship,
                    });
                }
            }
        }

        // A general question takes its area from the first cited act
        let primary = if primary == Category::General {
            acts.first().map_or(primary, |(_, category)| *category)
        } else {
            primary
        };

        CrossReference {
            citation_links,
            ..self.analyze(primary, context)
        }
    }

    fn warnings(
        &self,
        primary: Category,
        related: &[Category],
        context: Option<&ScenarioContext>,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for &other in related {
            match self.relationship(primary, other) {
                Some(RelationshipKind::Conflicting) => {
                    warnings.push(format!("{} may conflict with {}", other, primary))
                }
                Some(RelationshipKind::Prerequisite) => {
                    warnings.push(format!("{} is required before {} applies", other, primary))
                }
                Some(RelationshipKind::Complementary) => {
                    warnings.push(format!("{} may also apply alongside {}", other, primary))
                }
                _ => continue,
            }

            let Some(context) = context else { continue };
            if context.property_purchase && primary == Category::Duties && other == Category::LandTax {
                warnings.push("Land tax will apply annually after the property purchase".to_string());
            }
        }

        if let Some(context) = context {
            if context.property_purchase
                && context.first_home_buyer
                && related.contains(&Category::Grants)
            {
                warnings.push("First home buyer benefits may be available".to_string());
            }
            if context.business && primary == Category::PayrollTax {
                if let Some(payroll) = context.annual_payroll.filter(|p| *p > self.payroll_threshold) {
                    warnings.push(format!(
                        "Payroll tax applies: annual payroll ${:.0} exceeds the threshold",
                        payroll
                    ));
                }
            }
        }
        warnings
    }

    fn recommendations(
        &self,
        primary: Category,
        related: &[Category],
        context: Option<&ScenarioContext>,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();
        for &other in related {
            match self.relationship(primary, other) {
                Some(RelationshipKind::Beneficial) => {
                    recommendations.push(format!("Consider {} for potential benefits", other))
                }
                Some(RelationshipKind::Alternative) => recommendations
                    .push(format!("{} may be an alternative to {}", other, primary)),
                _ => {}
            }
        }

        if let Some(context) = context {
            if context.property_purchase {
                let premium = context
                    .property_value
                    .is_some_and(|v| v > self.premium_property_threshold);
                if premium && related.contains(&Category::LandTax) {
                    recommendations.push(format!(
                        "A premium property charge may apply to land valued over ${:.0}",
                        self.premium_property_threshold
                    ));
                }
                if context.first_home_buyer {
                    recommendations.push("Explore first home buyer exemptions and grants".to_string());
                }
            }
            if context.business {
                recommendations.push("Consider payroll tax planning if expanding the workforce".to_string());
            }
        }

        if related.len() > 2 {
            recommendations
                .push("Consider comprehensive tax planning given multiple tax implications".to_string());
        }
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::CitationExtractor;

    #[test]
    fn test_land_tax_reaches_grants_through_duties() {
        let graph = RelationshipGraph::default();
        let analysis = graph.analyze(Category::LandTax, None);

        assert_eq!(analysis.related, vec![Category::Duties, Category::Grants]);
        assert!(analysis.paths.contains(&vec![Category::LandTax, Category::Duties]));
        assert!(analysis
            .paths
            .contains(&vec![Category::LandTax, Category::Duties, Category::Grants]));
        assert_eq!(analysis.warnings, vec!["duties may also apply alongside land_tax"]);
        // 0.7 + 2 * 0.05 + 0.1
        assert!((analysis.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_property_purchase_context() {
        let graph = RelationshipGraph::default();
        let context = ScenarioContext {
            property_purchase: true,
            property_value: Some(3_500_000.0),
            first_home_buyer: true,
            ..ScenarioContext::default()
        };
        let analysis = graph.analyze(Category::Duties, Some(&context));

        assert_eq!(analysis.related, vec![Category::LandTax, Category::Grants]);
        assert!(analysis
            .warnings
            .contains(&"Land tax will apply annually after the property purchase".to_string()));
        assert!(analysis
            .warnings
            .contains(&"First home buyer benefits may be available".to_string()));
        assert!(analysis
            .recommendations
            .contains(&"Consider grants for potential benefits".to_string()));
        assert!(analysis.recommendations.iter().any(|r| r.contains("premium property")));
        assert!((analysis.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unlinked_area_has_no_relationships() {
        let graph = RelationshipGraph::default();
        let context = ScenarioContext {
            business: true,
            annual_payroll: Some(2_000_000.0),
            ..ScenarioContext::default()
        };
        let analysis = graph.analyze(Category::PayrollTax, Some(&context));

        assert!(analysis.related.is_empty());
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(analysis.warnings, vec!["No relationships found for payroll_tax"]);
    }

    #[test]
    fn test_payroll_threshold_warning() {
        let graph = RelationshipGraph::new(
            &[(Category::PayrollTax, Category::Administration, RelationshipKind::Prerequisite)],
            1_200_000.0,
            3_000_000.0,
        );
        let context = ScenarioContext {
            business: true,
            annual_payroll: Some(2_000_000.0),
            ..ScenarioContext::default()
        };
        let analysis = graph.analyze(Category::PayrollTax, Some(&context));

        assert_eq!(
            analysis.warnings,
            vec![
                "administration is required before payroll_tax applies".to_string(),
                "Payroll tax applies: annual payroll $2000000 exceeds the threshold".to_string(),
            ]
        );
        assert_eq!(
            analysis.recommendations,
            vec!["Consider payroll tax planning if expanding the workforce"]
        );
    }

    #[test]
    fn test_links_between_cited_acts() {
        let extractor = CitationExtractor::new().unwrap();
        let citations = extractor.extract(
            "The Duties Act 1997 section 31 applies at purchase. \
             Liability then arises under section 9 of the Land Tax Management Act 1956.",
        );
        let graph = RelationshipGraph::default();
        let analysis = graph.analyze_citations(Category::General, &citations, None);

        assert_eq!(analysis.primary, Category::Duties);
        assert_eq!(analysis.citation_links.len(), 1);
        assert_eq!(analysis.citation_links[0].relationship, RelationshipKind::Complementary);
        assert!(analysis.related.contains(&Category::LandTax));
    }

    #[test]
    fn test_scenario_from_query() {
        let entities = QueryEntities {
            dollar_values: vec![850_000.0],
            ..QueryEntities::default()
        };
        let context =
            ScenarioContext::from_query("Duty on my first home for $850k", Category::Duties, &entities)
                .unwrap();
        assert!(context.property_purchase && context.first_home_buyer);
        assert_eq!(context.property_value, Some(850_000.0));
        assert_eq!(context.annual_payroll, None);

        let context =
            ScenarioContext::from_query("Payroll tax on $850k", Category::PayrollTax, &entities).unwrap();
        assert!(context.business);
        assert_eq!(context.annual_payroll, Some(850_000.0));

        assert!(ScenarioContext::from_query("Fine of $850", Category::Fines, &entities).is_none());
    }

    #[test]
    fn test_relationship_is_symmetric() {
        let graph = RelationshipGraph::default();
        assert_eq!(
            graph.relationship(Category::Duties, Category::LandTax),
            Some(RelationshipKind::Complementary)
        );
        assert_eq!(
            graph.relationship(Category::LandTax, Category::Duties),
            Some(RelationshipKind::Complementary)
        );
        assert_eq!(graph.relationship(Category::Fines, Category::Duties), None);
    }
}

// 🏷️ Category Entity - Hierarchical categories with stable identity
//
// Categories form a tree: a child points at its parent by UUID. The tree is
// never held as live object links; `CategoryTree` is an arena keyed by UUID
// that is built once from a batch of rows and answers parent/children/path
// queries from memory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// CATEGORY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryType {
    /// Income category (money coming in)
    Income,

    /// Expense category (money going out)
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "Income",
            CategoryType::Expense => "Expense",
        }
    }

    /// Value persisted in the `type` column
    pub fn to_db(self) -> i64 {
        match self {
            CategoryType::Income => 0,
            CategoryType::Expense => 1,
        }
    }

    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(CategoryType::Income),
            1 => Some(CategoryType::Expense),
            _ => None,
        }
    }

    /// Sign-normalize an amount for this type: expenses are never positive,
    /// income is never negative.
    pub fn normalize(self, amount: f64) -> f64 {
        match self {
            CategoryType::Expense if amount > 0.0 => -amount,
            CategoryType::Income if amount < 0.0 => -amount,
            _ => amount,
        }
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// None until stored
    pub id: Option<Uuid>,

    pub name: String,

    pub category_type: CategoryType,

    /// Optional color for UI (e.g., "#FF5733")
    pub color: String,

    /// Parent category UUID. Root categories have none.
    pub parent: Option<Uuid>,
}

impl Category {
    pub fn new(name: impl Into<String>, category_type: CategoryType) -> Self {
        Category {
            id: None,
            name: name.into(),
            category_type,
            color: String::new(),
            parent: None,
        }
    }

    /// Create a child category under an already stored parent
    pub fn with_parent(name: impl Into<String>, category_type: CategoryType, parent: Uuid) -> Self {
        let mut category = Self::new(name, category_type);
        category.parent = Some(parent);
        category
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Placeholder for a row whose category was removed
    pub(crate) fn detached(id: Uuid, category_type: CategoryType) -> Self {
        let mut category = Self::new("", category_type);
        category.id = Some(id);
        category
    }

    pub fn was_stored(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ============================================================================
// CATEGORY TREE (arena keyed by UUID)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: HashMap<Uuid, Category>,
    children: HashMap<Uuid, Vec<Uuid>>,
    /// Insertion order of the source rows (alphabetical when loaded by the Book)
    order: Vec<Uuid>,
}

impl CategoryTree {
    /// Build the arena from a batch of stored categories. Rows without an id
    /// are skipped; parents that are not part of the batch are dropped so the
    /// child becomes a root.
    pub fn build(categories: Vec<Category>) -> Self {
        let mut tree = CategoryTree::default();

        for category in categories {
            if let Some(id) = category.id {
                tree.order.push(id);
                tree.nodes.insert(id, category);
            }
        }

        for id in &tree.order {
            let parent = tree.nodes.get(id).and_then(|c| c.parent);
            let Some(parent) = parent else {
                continue;
            };
            if tree.nodes.contains_key(&parent) {
                tree.children.entry(parent).or_default().push(*id);
            } else {
                tracing::warn!(category = %id, parent = %parent, "parent category not found, treating as root");
                if let Some(node) = tree.nodes.get_mut(id) {
                    node.parent = None;
                }
            }
        }

        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Category> {
        self.nodes.get(id)
    }

    pub fn parent_of(&self, id: &Uuid) -> Option<&Category> {
        self.nodes
            .get(id)
            .and_then(|c| c.parent)
            .and_then(|parent| self.nodes.get(&parent))
    }

    pub fn children_of(&self, id: &Uuid) -> Vec<&Category> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<&Category> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|c| c.is_root())
            .collect()
    }

    /// All categories in load order
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Names from the root down to the given category.
    ///
    /// Example: "Fast Food" → ["Food", "Restaurants", "Fast Food"]
    pub fn path(&self, id: &Uuid) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(id);
        // a corrupt cycle must not loop forever
        let mut guard = self.nodes.len();

        while let Some(category) = current {
            path.insert(0, category.name.clone());
            if guard == 0 {
                break;
            }
            guard -= 1;
            current = category.parent.and_then(|p| self.nodes.get(&p));
        }

        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, parent: Option<Uuid>) -> Category {
        let mut category = Category::new(name, CategoryType::Expense);
        category.id = Some(Uuid::new_v4());
        category.parent = parent;
        category
    }

    #[test]
    fn test_category_creation() {
        let category = Category::new("Food", CategoryType::Expense).with_color("#FF5733");

        assert_eq!(category.id, None);
        assert!(category.is_root());
        assert_eq!(category.color, "#FF5733");
        assert_eq!(category.category_type.as_str(), "Expense");
    }

    #[test]
    fn test_type_db_values() {
        assert_eq!(CategoryType::from_db(CategoryType::Income.to_db()), Some(CategoryType::Income));
        assert_eq!(CategoryType::from_db(CategoryType::Expense.to_db()), Some(CategoryType::Expense));
        assert_eq!(CategoryType::from_db(7), None);
    }

    #[test]
    fn test_normalize_sign_by_type() {
        assert_eq!(CategoryType::Expense.normalize(100.0), -100.0);
        assert_eq!(CategoryType::Expense.normalize(-100.0), -100.0);
        assert_eq!(CategoryType::Income.normalize(50.0), 50.0);
        assert_eq!(CategoryType::Income.normalize(-50.0), 50.0);
    }

    #[test]
    fn test_tree_links_parents_and_children() {
        let food = stored("Food", None);
        let food_id = food.id.unwrap();
        let restaurants = stored("Restaurants", Some(food_id));
        let restaurants_id = restaurants.id.unwrap();
        let fast_food = stored("Fast Food", Some(restaurants_id));
        let fast_food_id = fast_food.id.unwrap();
        let salary = stored("Salary", None);

        let tree = CategoryTree::build(vec![fast_food, food, restaurants, salary]);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.parent_of(&restaurants_id).unwrap().name, "Food");
        assert_eq!(tree.children_of(&food_id).len(), 1);
        assert_eq!(tree.path(&fast_food_id), vec!["Food", "Restaurants", "Fast Food"]);
    }

    #[test]
    fn test_tree_dangling_parent_becomes_root() {
        let orphan = stored("Orphan", Some(Uuid::new_v4()));
        let orphan_id = orphan.id.unwrap();

        let tree = CategoryTree::build(vec![orphan]);

        assert!(tree.get(&orphan_id).unwrap().is_root());
        assert!(tree.parent_of(&orphan_id).is_none());
        assert_eq!(tree.roots().len(), 1);
    }
}
